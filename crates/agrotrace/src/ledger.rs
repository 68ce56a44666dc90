//! The Ledger: append-only Merkle ledger over a leaf store.
//!
//! All mutation flows through one serialized entry point. The writer lock
//! owns the Merkle frontier; the published head (leaf count and root) only
//! moves after the new leaf is durably stored, so readers never observe a
//! leaf or root from an append that has not committed.
//!
//! The commit itself runs on its own task. Dropping an `append` future
//! abandons the receipt, never the commit: store, frontier and head always
//! move together.

use std::sync::{Arc, RwLock};

use agrotrace_core::{
    verify_proof, AnchorRequest, Digest, Leaf, MerkleFrontier, MerkleTree, Proof, Record,
    RecordKind, SignedRecord,
};
use agrotrace_store::{InsertResult, LeafStore};
use chrono::{SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::anchor::{AnchorError, AnchorOracle, AnchorReceipt};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::verify::Verifier;

/// What `append` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    pub index: u64,
    pub root: Digest,
    pub leaf_hash: Digest,
}

/// Outcome of anchoring the current root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorOutcome {
    pub anchor: AnchorReceipt,
    /// The anchor record's own position in the ledger.
    pub appended: AppendReceipt,
}

/// Result of a full invariant check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub leaf_count: u64,
    pub root: Option<Digest>,
    /// Leaves whose stored proof does not recompute their stored root.
    pub invalid_proofs: Vec<u64>,
    /// Leaves whose stored root differs from the root the ledger had then.
    pub root_mismatches: Vec<u64>,
    /// Positions where the stored index sequence breaks.
    pub gaps: Vec<u64>,
    /// Whether the published root equals the latest leaf's root.
    pub head_consistent: bool,
}

impl AuditReport {
    pub fn is_ok(&self) -> bool {
        self.invalid_proofs.is_empty()
            && self.root_mismatches.is_empty()
            && self.gaps.is_empty()
            && self.head_consistent
    }
}

/// Committed ledger state visible to readers.
#[derive(Debug, Clone, Copy, Default)]
struct Head {
    count: u64,
    root: Option<Digest>,
}

fn read_head(head: &RwLock<Head>) -> Head {
    // Head is plain data; a poisoned lock still holds the last published value.
    *head.read().unwrap_or_else(|e| e.into_inner())
}

/// Secondary keys and hash of a record waiting for its index.
struct PendingLeaf {
    hash: Digest,
    kind: RecordKind,
    batch_id: Option<String>,
    event_id: Option<String>,
}

/// Everything one commit touches, owned so it can outlive the caller.
struct Committer<S: LeafStore> {
    store: Arc<S>,
    writer: Arc<Mutex<MerkleFrontier>>,
    head: Arc<RwLock<Head>>,
    verify_on_append: bool,
}

impl<S: LeafStore> Committer<S> {
    async fn run(self, pending: PendingLeaf) -> Result<AppendReceipt> {
        let leaf_hash = pending.hash;
        let mut frontier = self.writer.lock().await;

        if let Some(existing) = self.store.get_leaf_by_hash(&leaf_hash).await? {
            return Err(LedgerError::DuplicateRecord {
                leaf_hash,
                existing_index: existing.index,
            });
        }

        let index = frontier.len();
        let mut next = frontier.clone();
        let (root, proof) = next.push(leaf_hash);

        if self.verify_on_append && !verify_proof(&leaf_hash, &proof, index, &root) {
            return Err(LedgerError::Corrupted(format!(
                "proof for new leaf {index} does not verify against {root}"
            )));
        }

        let leaf = Leaf {
            index,
            hash: leaf_hash,
            kind: pending.kind,
            batch_id: pending.batch_id,
            event_id: pending.event_id,
            root,
            proof,
            appended_at: Utc::now().trunc_subsecs(3),
        };

        match self.store.insert_leaf(&leaf).await? {
            InsertResult::Inserted => {}
            InsertResult::Conflict { existing } => {
                return Err(LedgerError::IndexConflict { index, existing });
            }
            InsertResult::DuplicateHash { existing_index } => {
                return Err(LedgerError::DuplicateRecord {
                    leaf_hash,
                    existing_index,
                });
            }
        }

        *frontier = next;
        *self.head.write().unwrap_or_else(|e| e.into_inner()) = Head {
            count: index + 1,
            root: Some(root),
        };

        info!(
            index,
            kind = leaf.kind.as_str(),
            batch_id = leaf.batch_id.as_deref().unwrap_or("-"),
            root = %root,
            "appended leaf"
        );

        Ok(AppendReceipt {
            index,
            root,
            leaf_hash,
        })
    }
}

/// The append-only ledger.
pub struct Ledger<S: LeafStore> {
    store: Arc<S>,
    config: LedgerConfig,
    /// Serializes appends. Holds the frontier for the committed head.
    writer: Arc<Mutex<MerkleFrontier>>,
    head: Arc<RwLock<Head>>,
}

impl<S: LeafStore + 'static> Ledger<S> {
    /// Open a ledger over `store`, restoring state from stored leaves.
    ///
    /// Fails with [`LedgerError::Corrupted`] when stored indices have gaps or
    /// the restored root differs from the latest leaf's recorded root.
    pub async fn open(store: S, config: LedgerConfig) -> Result<Self> {
        Self::open_shared(Arc::new(store), config).await
    }

    /// Like [`open`](Self::open), for a store shared with other components.
    pub async fn open_shared(store: Arc<S>, config: LedgerConfig) -> Result<Self> {
        let hashes = store.leaf_hashes().await?;
        if let Some(pos) = hashes
            .iter()
            .enumerate()
            .position(|(pos, (index, _))| *index != pos as u64)
        {
            return Err(LedgerError::Corrupted(format!(
                "leaf indices are not dense: position {pos} holds index {}",
                hashes[pos].0
            )));
        }

        let frontier = MerkleFrontier::from_leaves(hashes.iter().map(|(_, hash)| hash));
        let root = frontier.root();

        match (root, store.latest_leaf().await?) {
            (None, None) => {}
            (Some(root), Some(latest))
                if latest.root == root && latest.index + 1 == frontier.len() => {}
            (root, latest) => {
                return Err(LedgerError::Corrupted(format!(
                    "restored root {:?} does not match latest leaf root {:?}",
                    root,
                    latest.map(|l| l.root)
                )));
            }
        }

        info!(leaves = frontier.len(), root = ?root, "ledger opened");

        let head = Head {
            count: frontier.len(),
            root,
        };
        Ok(Self {
            store,
            config,
            writer: Arc::new(Mutex::new(frontier)),
            head: Arc::new(RwLock::new(head)),
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// A verifier reading the same store.
    pub fn verifier<O: AnchorOracle + ?Sized>(&self, oracle: Arc<O>) -> Verifier<S, O> {
        Verifier::new(self.store.clone(), oracle, self.config.clone())
    }

    fn head(&self) -> Head {
        read_head(&self.head)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a record.
    ///
    /// Computes `leaf_hash = digest(canonicalize(record))`, assigns the next
    /// index, extends the tree and persists the leaf with its proof and the
    /// resulting root. Concurrent appends are serialized: every call gets a
    /// distinct index and the final root covers all of them.
    ///
    /// Once polled, a record that passes validation is committed even if the
    /// returned future is dropped before it resolves.
    pub async fn append(&self, record: &Record) -> Result<AppendReceipt> {
        record.validate()?;
        let pending = PendingLeaf {
            hash: record.leaf_hash()?,
            kind: record.kind(),
            batch_id: record.batch_id().map(str::to_string),
            event_id: record.event_id().map(str::to_string),
        };

        let committer = Committer {
            store: self.store.clone(),
            writer: self.writer.clone(),
            head: self.head.clone(),
            verify_on_append: self.config.verify_on_append,
        };

        tokio::spawn(committer.run(pending))
            .await
            .map_err(|e| LedgerError::TaskFailed(e.to_string()))?
    }

    /// Append a signed record after checking its signature.
    pub async fn append_signed(&self, signed: &SignedRecord) -> Result<AppendReceipt> {
        if !signed.verify_signature() {
            return Err(LedgerError::InvalidInput(
                "record signature does not verify".into(),
            ));
        }
        self.append(&signed.record).await
    }

    /// Submit the current root to `oracle` and record the anchor in the ledger.
    ///
    /// The oracle call runs under the configured anchor timeout.
    pub async fn anchor_current_root<O: AnchorOracle + ?Sized>(
        &self,
        oracle: &O,
    ) -> Result<AnchorOutcome> {
        let head = self.head();
        let root = head
            .root
            .ok_or_else(|| LedgerError::InvalidInput("cannot anchor an empty ledger".into()))?;

        let timeout = self.config.anchor_timeout;
        let anchor = match tokio::time::timeout(timeout, oracle.submit(&root)).await {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(root = %root, error = %e, "anchor submission failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(root = %root, ?timeout, "anchor submission timed out");
                return Err(AnchorError::Timeout(timeout).into());
            }
        };

        info!(root = %root, external_ref = %anchor.external_ref, "root anchored");

        let record = Record::Anchor(AnchorRequest {
            root,
            leaf_count: head.count,
            requested_at: anchor.anchored_at.trunc_subsecs(3),
            external_ref: Some(anchor.external_ref.clone()),
        });
        let appended = self.append(&record).await?;

        Ok(AnchorOutcome { anchor, appended })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The current root, or `None` for an empty ledger.
    pub fn current_root(&self) -> Option<Digest> {
        self.head().root
    }

    /// Number of committed leaves.
    pub fn leaf_count(&self) -> u64 {
        self.head().count
    }

    /// Stored proof for the leaf at `index`, against its insertion root.
    pub async fn get_proof(&self, index: u64) -> Result<Proof> {
        self.get_leaf(index)
            .await?
            .map(|leaf| leaf.inclusion_proof())
            .ok_or_else(|| LedgerError::NotFound(format!("leaf index {index}")))
    }

    /// The committed leaf at `index`.
    pub async fn get_leaf(&self, index: u64) -> Result<Option<Leaf>> {
        if index >= self.head().count {
            return Ok(None);
        }
        Ok(self.store.get_leaf(index).await?)
    }

    /// Committed leaves owned by a batch, ordered by index.
    pub async fn leaves_for_batch(&self, batch_id: &str) -> Result<Vec<Leaf>> {
        let count = self.head().count;
        let mut leaves = self.store.leaves_for_batch(batch_id).await?;
        leaves.retain(|leaf| leaf.index < count);
        Ok(leaves)
    }

    /// Committed leaves for an event id, ordered by index.
    pub async fn leaves_for_event(&self, event_id: &str) -> Result<Vec<Leaf>> {
        let count = self.head().count;
        let mut leaves = self.store.leaves_for_event(event_id).await?;
        leaves.retain(|leaf| leaf.index < count);
        Ok(leaves)
    }

    /// Regenerate a proof for `index` against the current root.
    ///
    /// Stored proofs bind a leaf to its insertion root; this one binds it to
    /// the root every later leaf has been folded into.
    pub async fn prove_against_current(&self, index: u64) -> Result<Proof> {
        let head = self.head();
        if index >= head.count {
            return Err(LedgerError::NotFound(format!("leaf index {index}")));
        }

        let hashes: Vec<Digest> = self
            .store
            .leaf_hashes()
            .await?
            .into_iter()
            .take(head.count as usize)
            .map(|(_, hash)| hash)
            .collect();
        let tree = MerkleTree::from_leaves(&hashes)?;

        if tree.root() != head.root {
            return Err(LedgerError::Corrupted(format!(
                "rebuilt root {:?} differs from current root {:?}",
                tree.root(),
                head.root
            )));
        }

        tree.inclusion_proof(index)
            .ok_or_else(|| LedgerError::NotFound(format!("leaf index {index}")))
    }

    /// Re-check every stored leaf against the ledger invariants.
    ///
    /// Violations are reported, not raised; storage failures are errors.
    pub async fn audit(&self) -> Result<AuditReport> {
        let head = self.head();
        let mut report = AuditReport {
            leaf_count: head.count,
            root: head.root,
            ..AuditReport::default()
        };

        let mut frontier = MerkleFrontier::new();
        let mut latest_root = None;

        for (pos, (index, _)) in self.store.leaf_hashes().await?.into_iter().enumerate() {
            if index >= head.count {
                break;
            }
            if index != pos as u64 {
                warn!(expected = pos, found = index, "leaf index gap");
                report.gaps.push(pos as u64);
                break;
            }

            let Some(leaf) = self.store.get_leaf(index).await? else {
                report.gaps.push(index);
                break;
            };

            if !leaf.verify() {
                warn!(index, "stored proof does not verify");
                report.invalid_proofs.push(index);
            }

            let (expected_root, _) = frontier.push(leaf.hash);
            if leaf.root != expected_root {
                warn!(index, "stored root differs from recomputed root");
                report.root_mismatches.push(index);
            }
            latest_root = Some(leaf.root);
        }

        report.head_consistent = latest_root == head.root && frontier.len() == head.count;
        if !report.head_consistent {
            warn!(?latest_root, current = ?head.root, "head does not match latest leaf");
        }

        debug!(leaves = head.count, ok = report.is_ok(), "audit complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrotrace_core::{BatchRecord, EventRecord, EventType, Origin};
    use agrotrace_store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn batch(id: &str) -> Record {
        Record::Batch(BatchRecord {
            batch_id: id.to_string(),
            product: "cacao".to_string(),
            variety: None,
            producer: "coop-4".to_string(),
            origin: Origin {
                farm: "la-esperanza".to_string(),
                region: None,
            },
            quantity: 300.0,
            unit: "kg".to_string(),
            harvested_at: Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap(),
            attributes: BTreeMap::new(),
        })
    }

    fn event(id: &str, batch_id: &str) -> Record {
        Record::Event(EventRecord {
            event_id: id.to_string(),
            batch_id: batch_id.to_string(),
            event_type: EventType::Inspected,
            actor: "inspector-9".to_string(),
            location: Some("warehouse-2".to_string()),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap(),
            details: BTreeMap::new(),
        })
    }

    async fn memory_ledger() -> Ledger<MemoryStore> {
        Ledger::open(MemoryStore::new(), LedgerConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = memory_ledger().await;
        assert_eq!(ledger.current_root(), None);
        assert_eq!(ledger.leaf_count(), 0);
        assert!(matches!(
            ledger.get_proof(0).await,
            Err(LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_append_assigns_dense_indices() {
        let ledger = memory_ledger().await;
        for i in 0..5u64 {
            let receipt = ledger.append(&batch(&format!("B-{i}"))).await.unwrap();
            assert_eq!(receipt.index, i);
            assert_eq!(ledger.current_root(), Some(receipt.root));
        }
        assert_eq!(ledger.leaf_count(), 5);
    }

    #[tokio::test]
    async fn test_stored_proofs_verify_against_insertion_root() {
        let ledger = memory_ledger().await;
        let mut receipts = Vec::new();
        for i in 0..7 {
            receipts.push(ledger.append(&batch(&format!("B-{i}"))).await.unwrap());
        }
        for receipt in receipts {
            let proof = ledger.get_proof(receipt.index).await.unwrap();
            assert_eq!(proof.root, receipt.root);
            assert_eq!(proof.leaf, receipt.leaf_hash);
            assert!(proof.verify());
        }
    }

    #[tokio::test]
    async fn test_duplicate_record_rejected() {
        let ledger = memory_ledger().await;
        ledger.append(&batch("B-1")).await.unwrap();
        assert!(matches!(
            ledger.append(&batch("B-1")).await,
            Err(LedgerError::DuplicateRecord {
                existing_index: 0,
                ..
            })
        ));
        assert_eq!(ledger.leaf_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_record_rejected() {
        let ledger = memory_ledger().await;
        assert!(matches!(
            ledger.append(&batch("")).await,
            Err(LedgerError::Core(_))
        ));
        assert_eq!(ledger.leaf_count(), 0);
    }

    #[tokio::test]
    async fn test_secondary_keys() {
        let ledger = memory_ledger().await;
        ledger.append(&batch("B-1")).await.unwrap();
        ledger.append(&batch("B-2")).await.unwrap();
        ledger.append(&event("E-1", "B-1")).await.unwrap();

        let leaves = ledger.leaves_for_batch("B-1").await.unwrap();
        assert_eq!(leaves.iter().map(|l| l.index).collect::<Vec<_>>(), vec![0, 2]);

        let events = ledger.leaves_for_event("E-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].batch_id.as_deref(), Some("B-1"));
    }

    #[tokio::test]
    async fn test_prove_against_current() {
        let ledger = memory_ledger().await;
        for i in 0..6 {
            ledger.append(&batch(&format!("B-{i}"))).await.unwrap();
        }
        let proof = ledger.prove_against_current(1).await.unwrap();
        assert_eq!(Some(proof.root), ledger.current_root());
        assert!(proof.verify());

        let stored = ledger.get_proof(1).await.unwrap();
        assert_ne!(stored.root, proof.root);
        assert!(stored.verify());
    }

    #[tokio::test]
    async fn test_reopen_restores_head() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::open_shared(store.clone(), LedgerConfig::default())
            .await
            .unwrap();
        for i in 0..4 {
            ledger.append(&batch(&format!("B-{i}"))).await.unwrap();
        }
        let root = ledger.current_root();
        drop(ledger);

        let reopened = Ledger::open_shared(store, LedgerConfig::default())
            .await
            .unwrap();
        assert_eq!(reopened.current_root(), root);
        assert_eq!(reopened.leaf_count(), 4);
        let receipt = reopened.append(&batch("B-4")).await.unwrap();
        assert_eq!(receipt.index, 4);
    }

    #[tokio::test]
    async fn test_open_detects_root_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let mut frontier = MerkleFrontier::new();
        let hash = Digest::hash(b"leaf");
        let (_, proof) = frontier.push(hash);
        store
            .insert_leaf(&Leaf {
                index: 0,
                hash,
                kind: agrotrace_core::RecordKind::Batch,
                batch_id: None,
                event_id: None,
                root: Digest::hash(b"not the root"),
                proof,
                appended_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(matches!(
            Ledger::open_shared(store, LedgerConfig::default()).await,
            Err(LedgerError::Corrupted(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_clean_ledger() {
        let ledger = memory_ledger().await;
        for i in 0..9 {
            ledger.append(&batch(&format!("B-{i}"))).await.unwrap();
        }
        let report = ledger.audit().await.unwrap();
        assert!(report.is_ok(), "{report:?}");
        assert_eq!(report.leaf_count, 9);
    }

    #[tokio::test]
    async fn test_anchor_current_root() {
        let ledger = memory_ledger().await;
        let oracle = crate::anchor::MemoryAnchorOracle::new();

        assert!(matches!(
            ledger.anchor_current_root(&oracle).await,
            Err(LedgerError::InvalidInput(_))
        ));

        let first = ledger.append(&batch("B-1")).await.unwrap();
        let outcome = ledger.anchor_current_root(&oracle).await.unwrap();
        assert_eq!(outcome.anchor.root, first.root);
        assert_eq!(outcome.appended.index, 1);

        let anchor_leaf = ledger.get_leaf(1).await.unwrap().unwrap();
        assert_eq!(anchor_leaf.kind, agrotrace_core::RecordKind::Anchor);
        assert_eq!(anchor_leaf.batch_id, None);
    }

    #[tokio::test]
    async fn test_anchor_submission_failure_surfaces() {
        let ledger = memory_ledger().await;
        let oracle = crate::anchor::MemoryAnchorOracle::new();
        oracle.set_unreachable(true);
        ledger.append(&batch("B-1")).await.unwrap();

        assert!(matches!(
            ledger.anchor_current_root(&oracle).await,
            Err(LedgerError::Anchor(AnchorError::Unavailable(_)))
        ));
        assert_eq!(ledger.leaf_count(), 1);
    }
}
