//! # AgroTrace Store
//!
//! Leaf persistence for the AgroTrace ledger. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`LeafStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a leaf
//!
//! ## Usage
//!
//! ```rust,no_run
//! use agrotrace_store::{LeafStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!     let leaves = store.leaves_for_batch("B-2024-001").await.unwrap();
//!     for leaf in leaves {
//!         assert!(leaf.verify());
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Write-once**: leaves are never updated or deleted
//! - **Conflict detection**: an occupied index returns `Conflict`
//! - **Hash uniqueness**: a leaf hash already stored returns `DuplicateHash`
//! - **Density**: an index that would leave a gap is rejected

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, LeafStore};
