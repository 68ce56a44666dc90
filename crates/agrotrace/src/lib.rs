//! # AgroTrace
//!
//! Authenticated append-only ledger for agricultural batch tracking, and
//! the protocol that decides whether a batch record is authentic.
//!
//! ## Overview
//!
//! - **Ledger**: ordered, append-only leaves over a Merkle accumulator;
//!   every leaf keeps the proof and root from its own insertion
//! - **Verification**: signature check, inclusion check and an optional
//!   external anchor check folded into one verdict
//! - **Anchoring**: submit a root to an external timestamping oracle
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agrotrace::{Ledger, LedgerConfig, MemoryAnchorOracle, VerifyRequest};
//! use agrotrace::store::SqliteStore;
//!
//! async fn example(record: agrotrace::core::Record) {
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!     let ledger = Ledger::open(store, LedgerConfig::default()).await.unwrap();
//!
//!     let receipt = ledger.append(&record).await.unwrap();
//!     let proof = ledger.get_proof(receipt.index).await.unwrap();
//!     assert!(proof.verify());
//!
//!     let verifier = ledger.verifier(Arc::new(MemoryAnchorOracle::new()));
//!     let result = verifier
//!         .verify_batch(VerifyRequest::for_batch("B-2024-001"))
//!         .await
//!         .unwrap();
//!     println!("{}: {}", result.verified, result.reason);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `agrotrace::core` - Digests, records, signatures, Merkle proofs
//! - `agrotrace::store` - Leaf storage abstraction and SQLite

pub mod anchor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod verify;

// Re-export component crates
pub use agrotrace_core as core;
pub use agrotrace_store as store;

// Re-export main types for convenience
pub use anchor::{AnchorError, AnchorOracle, AnchorReceipt, AnchorStatus, MemoryAnchorOracle};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use ledger::{AnchorOutcome, AppendReceipt, AuditReport, Ledger};
pub use verify::{
    RejectReason, Verdict, VerificationMode, VerificationResult, Verifier, VerifyRequest,
};

// Re-export commonly used core types
pub use agrotrace_core::{
    generate_keypair, verify_proof, Digest, Keypair, Leaf, Proof, PublicKey, Record, RecordKind,
    Signature, SignedRecord,
};
