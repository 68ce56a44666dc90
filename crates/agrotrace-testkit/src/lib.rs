//! # AgroTrace Testkit
//!
//! Testing utilities for the AgroTrace ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Records with their expected canonical bytes
//! - **Generators**: Proptest strategies for records, keys and leaf sets
//! - **Fixtures**: Producer identities and ready-made ledgers
//!
//! ## Golden Vectors
//!
//! ```rust
//! use agrotrace_testkit::vectors::verify_all_vectors;
//!
//! assert!(verify_all_vectors().is_empty());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use agrotrace_testkit::generators::record;
//!
//! proptest! {
//!     #[test]
//!     fn leaf_hash_is_deterministic(r in record()) {
//!         prop_assert_eq!(r.leaf_hash().unwrap(), r.clone().leaf_hash().unwrap());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use agrotrace_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let signed = fixture.signed_batch("B-2024-001");
//! assert!(signed.verify_signature());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{epoch, memory_ledger, multi_party_fixtures, sqlite_ledger, TestFixture};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
