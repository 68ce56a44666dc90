//! Error types for the AgroTrace core.

use thiserror::Error;

/// Errors raised by pure core operations.
///
/// Signature *verification* never produces one of these: a bad signature is
/// reported as `false`. These errors cover malformed input only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// A leaf hash appears twice in one tree.
    #[error("duplicate leaf {leaf} at index {index}")]
    DuplicateLeaf { leaf: String, index: u64 },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
