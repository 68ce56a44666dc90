//! Error types for the ledger facade.

use agrotrace_core::{CoreError, Digest};
use agrotrace_store::StoreError;
use thiserror::Error;

use crate::anchor::AnchorError;

/// Errors that can occur during ledger operations.
///
/// A record that fails verification is not an error: it comes back as a
/// rejected [`VerificationResult`](crate::VerificationResult).
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed key, digest, record or canonicalization failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Anchor submission failed.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Unknown leaf index or batch.
    #[error("not found: {0}")]
    NotFound(String),

    /// Structurally invalid request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The record is already in the ledger.
    #[error("record {leaf_hash} already appended at index {existing_index}")]
    DuplicateRecord {
        leaf_hash: Digest,
        existing_index: u64,
    },

    /// The store already holds a different leaf at this index.
    #[error("index {index} already holds leaf {existing}")]
    IndexConflict { index: u64, existing: Digest },

    /// The commit task panicked or was aborted by runtime shutdown.
    #[error("append task failed: {0}")]
    TaskFailed(String),

    /// Stored leaves violate a ledger invariant.
    #[error("ledger corrupted: {0}")]
    Corrupted(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
