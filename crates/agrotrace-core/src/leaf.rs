//! Leaf: one hashed record in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::iso8601;
use crate::digest::Digest;
use crate::merkle::{verify_proof, Proof};
use crate::record::RecordKind;

/// A stored ledger leaf.
///
/// `index` is assigned exactly once. `root` and `proof` are fixed at
/// insertion time and never rewritten; the proof always verifies against
/// `root`, not against whatever root is current later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    pub index: u64,
    pub hash: Digest,
    pub kind: RecordKind,
    pub batch_id: Option<String>,
    pub event_id: Option<String>,
    /// Root of the ledger right after this leaf was appended.
    pub root: Digest,
    pub proof: Vec<Digest>,
    #[serde(with = "iso8601")]
    pub appended_at: DateTime<Utc>,
}

impl Leaf {
    /// The stored proof as a self-contained claim.
    pub fn inclusion_proof(&self) -> Proof {
        Proof {
            leaf: self.hash,
            siblings: self.proof.clone(),
            leaf_index: self.index,
            root: self.root,
        }
    }

    /// Check that the stored proof recomputes the stored root.
    pub fn verify(&self) -> bool {
        verify_proof(&self.hash, &self.proof, self.index, &self.root)
    }
}
