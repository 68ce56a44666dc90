//! LeafStore trait: the abstract interface for leaf persistence.
//!
//! The ledger is storage-agnostic. Implementations include SQLite
//! (primary) and in-memory (for tests).

use async_trait::async_trait;
use agrotrace_core::{Digest, Leaf};

use crate::error::Result;

/// Result of inserting a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Leaf was inserted successfully.
    Inserted,
    /// The same leaf hash is already stored at another index.
    DuplicateHash {
        /// Index of the stored leaf with this hash.
        existing_index: u64,
    },
    /// Conflict: a leaf already occupies this index.
    Conflict {
        /// Hash of the leaf already at this index.
        existing: Digest,
    },
}

/// The LeafStore trait: async interface for leaf persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Write-once**: a stored leaf is never updated or deleted.
/// - **Ordering**: every multi-leaf read is ordered by index.
/// - **Single writer**: the store does not assign indices; the ledger does,
///   and inserts must arrive in index order.
#[async_trait]
pub trait LeafStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a leaf at `leaf.index`.
    ///
    /// # Returns
    /// - `Inserted` if the index was free and the hash is new.
    /// - `DuplicateHash` if the same hash is stored at another index.
    /// - `Conflict` if the index is already occupied.
    async fn insert_leaf(&self, leaf: &Leaf) -> Result<InsertResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Point lookups
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a leaf by index.
    async fn get_leaf(&self, index: u64) -> Result<Option<Leaf>>;

    /// Get the leaf carrying `hash`.
    async fn get_leaf_by_hash(&self, hash: &Digest) -> Result<Option<Leaf>>;

    /// The most recently appended leaf.
    async fn latest_leaf(&self) -> Result<Option<Leaf>>;

    /// Number of stored leaves.
    async fn leaf_count(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Secondary keys
    // ─────────────────────────────────────────────────────────────────────────

    /// All leaves owned by a batch, ordered by index.
    async fn leaves_for_batch(&self, batch_id: &str) -> Result<Vec<Leaf>>;

    /// All leaves for an event id, ordered by index.
    async fn leaves_for_event(&self, event_id: &str) -> Result<Vec<Leaf>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk
    // ─────────────────────────────────────────────────────────────────────────

    /// Every `(index, hash)` pair, ordered by index.
    ///
    /// Used to restore the Merkle frontier and to regenerate proofs.
    async fn leaf_hashes(&self) -> Result<Vec<(u64, Digest)>>;
}
