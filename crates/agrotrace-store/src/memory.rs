//! In-memory implementation of the LeafStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use agrotrace_core::{Digest, Leaf};
use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, LeafStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Leaves by index. Dense: position == index.
    leaves: Vec<Leaf>,

    /// Hash index: leaf_hash -> index.
    by_hash: HashMap<Digest, u64>,

    /// Secondary key: batch_id -> indices.
    by_batch: HashMap<String, Vec<u64>>,

    /// Secondary key: event_id -> indices.
    by_event: HashMap<String, Vec<u64>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl MemoryStoreInner {
    fn collect(&self, indices: Option<&Vec<u64>>) -> Vec<Leaf> {
        indices
            .map(|ids| {
                ids.iter()
                    .filter_map(|&i| self.leaves.get(i as usize).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LeafStore for MemoryStore {
    async fn insert_leaf(&self, leaf: &Leaf) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if let Some(existing) = inner.leaves.get(leaf.index as usize) {
            return Ok(InsertResult::Conflict {
                existing: existing.hash,
            });
        }

        if let Some(&existing_index) = inner.by_hash.get(&leaf.hash) {
            return Ok(InsertResult::DuplicateHash { existing_index });
        }

        if leaf.index != inner.leaves.len() as u64 {
            return Err(StoreError::InvalidData(format!(
                "leaf index {} would leave a gap after {} leaves",
                leaf.index,
                inner.leaves.len()
            )));
        }

        inner.by_hash.insert(leaf.hash, leaf.index);
        if let Some(batch_id) = &leaf.batch_id {
            inner
                .by_batch
                .entry(batch_id.clone())
                .or_default()
                .push(leaf.index);
        }
        if let Some(event_id) = &leaf.event_id {
            inner
                .by_event
                .entry(event_id.clone())
                .or_default()
                .push(leaf.index);
        }
        inner.leaves.push(leaf.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get_leaf(&self, index: u64) -> Result<Option<Leaf>> {
        let inner = self.read()?;
        Ok(inner.leaves.get(index as usize).cloned())
    }

    async fn get_leaf_by_hash(&self, hash: &Digest) -> Result<Option<Leaf>> {
        let inner = self.read()?;
        Ok(inner
            .by_hash
            .get(hash)
            .and_then(|&i| inner.leaves.get(i as usize).cloned()))
    }

    async fn latest_leaf(&self) -> Result<Option<Leaf>> {
        let inner = self.read()?;
        Ok(inner.leaves.last().cloned())
    }

    async fn leaf_count(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.leaves.len() as u64)
    }

    async fn leaves_for_batch(&self, batch_id: &str) -> Result<Vec<Leaf>> {
        let inner = self.read()?;
        Ok(inner.collect(inner.by_batch.get(batch_id)))
    }

    async fn leaves_for_event(&self, event_id: &str) -> Result<Vec<Leaf>> {
        let inner = self.read()?;
        Ok(inner.collect(inner.by_event.get(event_id)))
    }

    async fn leaf_hashes(&self) -> Result<Vec<(u64, Digest)>> {
        let inner = self.read()?;
        Ok(inner.leaves.iter().map(|l| (l.index, l.hash)).collect())
    }
}
