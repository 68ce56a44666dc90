//! Merkle accumulator.
//!
//! Tree shape: leaves are paired left to right at each level, and an odd
//! final node is paired with itself (duplicated) rather than promoted. This
//! shape is frozen; every issued proof depends on it.
//!
//! Two constructions produce identical roots and proofs:
//! - [`MerkleTree`] rebuilds the whole tree from the ordered leaf hashes.
//! - [`MerkleFrontier`] keeps only the O(log N) peaks and extends them on
//!   each append.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{CoreError, Result};

/// Verify an inclusion proof. Pure, no I/O.
///
/// Starting from `leaf` at position `index`, each sibling is combined on the
/// right when the position is even and on the left when it is odd, then the
/// position is halved. The proof holds when the result equals `root`.
///
/// Two further checks bind the claimed index to the proof: the index must be
/// fully consumed by the proof depth, and a left-hand sibling may never equal
/// the running hash (only a duplicated right-hand node repeats).
///
/// The second check requires that the tree holds no repeated leaf hash. Two
/// equal leaves make equal neighbouring subtrees, and their honest proofs are
/// refused. [`MerkleTree::from_leaves`] and the ledger both reject duplicates.
pub fn verify_proof(leaf: &Digest, siblings: &[Digest], index: u64, root: &Digest) -> bool {
    let mut computed = *leaf;
    let mut i = index;

    for sibling in siblings {
        if i % 2 == 0 {
            computed = Digest::combine(&computed, sibling);
        } else {
            if *sibling == computed {
                return false;
            }
            computed = Digest::combine(sibling, &computed);
        }
        i /= 2;
    }

    i == 0 && computed == *root
}

/// A self-contained inclusion claim. Verifiable offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub leaf: Digest,
    pub siblings: Vec<Digest>,
    pub leaf_index: u64,
    pub root: Digest,
}

impl Proof {
    /// Recompute the root from the leaf and siblings.
    pub fn verify(&self) -> bool {
        verify_proof(&self.leaf, &self.siblings, self.leaf_index, &self.root)
    }
}

/// Full binary Merkle tree over an ordered list of leaf hashes.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Level 0 = leaves, last level = root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build the tree. An empty list has no root.
    ///
    /// Fails with [`CoreError::DuplicateLeaf`] if a leaf hash repeats: proofs
    /// over such a tree would not pass [`verify_proof`].
    pub fn from_leaves(leaves: &[Digest]) -> Result<Self> {
        if leaves.is_empty() {
            return Ok(Self { levels: Vec::new() });
        }

        let mut seen = HashSet::with_capacity(leaves.len());
        for (index, leaf) in leaves.iter().enumerate() {
            if !seen.insert(leaf) {
                return Err(CoreError::DuplicateLeaf {
                    leaf: leaf.to_hex(),
                    index: index as u64,
                });
            }
        }

        let mut levels = vec![leaves.to_vec()];
        let mut current = leaves.to_vec();

        while current.len() > 1 {
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| {
                    // Odd node: hash with itself.
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    Digest::combine(&pair[0], right)
                })
                .collect();
            levels.push(next.clone());
            current = next;
        }

        Ok(Self { levels })
    }

    /// Number of leaves.
    pub fn len(&self) -> u64 {
        self.levels.first().map_or(0, |l| l.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The root, or `None` for an empty tree.
    pub fn root(&self) -> Option<Digest> {
        self.levels.last().and_then(|l| l.first()).copied()
    }

    /// Sibling path for the leaf at `index`, bottom up.
    pub fn proof(&self, index: u64) -> Option<Vec<Digest>> {
        if index >= self.len() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut idx = index as usize;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            let sibling = level.get(sibling_idx).unwrap_or(&level[idx]);
            siblings.push(*sibling);
            idx /= 2;
        }

        Some(siblings)
    }

    /// Full proof object for the leaf at `index`.
    pub fn inclusion_proof(&self, index: u64) -> Option<Proof> {
        let siblings = self.proof(index)?;
        let root = self.root()?;
        Some(Proof {
            leaf: self.levels[0][index as usize],
            siblings,
            leaf_index: index,
            root,
        })
    }
}

/// Incremental Merkle frontier.
///
/// Holds one optional peak per height: the root of the complete subtree of
/// `2^h` leaves at that height, present exactly when bit `h` of the leaf
/// count is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleFrontier {
    peaks: Vec<Option<Digest>>,
    count: u64,
}

impl MerkleFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from the ordered leaf hashes.
    pub fn from_leaves<'a>(leaves: impl IntoIterator<Item = &'a Digest>) -> Self {
        let mut frontier = Self::new();
        for leaf in leaves {
            frontier.push(*leaf);
        }
        frontier
    }

    /// Number of leaves appended.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn peak(&self, height: usize) -> Option<Digest> {
        self.peaks.get(height).copied().flatten()
    }

    /// Current root, or `None` when empty.
    pub fn root(&self) -> Option<Digest> {
        let n = self.count;
        if n == 0 {
            return None;
        }

        // `tail` is the partial rightmost node at the current height.
        let mut tail: Option<Digest> = None;
        let mut h = 0usize;
        loop {
            if level_width(n, h) == 1 {
                return tail.or_else(|| self.peak(h));
            }
            if (n >> h) & 1 == 1 {
                let peak = self.peak(h)?;
                tail = Some(Digest::combine(&peak, &tail.unwrap_or(peak)));
            } else {
                tail = tail.map(|t| Digest::combine(&t, &t));
            }
            h += 1;
        }
    }

    /// Append a leaf. Returns the new root and the new leaf's proof.
    ///
    /// The caller keeps leaf hashes unique; see [`verify_proof`].
    ///
    /// The proof is exactly what [`MerkleTree::proof`] yields for this leaf
    /// over all leaves appended so far.
    pub fn push(&mut self, leaf: Digest) -> (Digest, Vec<Digest>) {
        let index = self.count;

        let mut siblings = Vec::new();
        let mut acc = leaf;
        let mut h = 0usize;
        while (index >> h) > 0 {
            if (index >> h) & 1 == 1 {
                // Left neighbour is the complete subtree stored as a peak.
                let left = self.peak(h).unwrap_or(acc);
                siblings.push(left);
                acc = Digest::combine(&left, &acc);
            } else {
                // Rightmost node with no partner: duplicated.
                siblings.push(acc);
                acc = Digest::combine(&acc, &acc);
            }
            h += 1;
        }
        let root = acc;

        let mut carry = leaf;
        let mut height = 0usize;
        loop {
            if height == self.peaks.len() {
                self.peaks.push(None);
            }
            match self.peaks[height].take() {
                Some(peak) => {
                    carry = Digest::combine(&peak, &carry);
                    height += 1;
                }
                None => {
                    self.peaks[height] = Some(carry);
                    break;
                }
            }
        }
        self.count += 1;

        (root, siblings)
    }
}

/// Nodes at height `h` for `n` leaves: `ceil(n / 2^h)`.
fn level_width(n: u64, h: usize) -> u64 {
    if h >= 64 {
        return 1;
    }
    let width = n >> h;
    if n & ((1u64 << h) - 1) != 0 {
        width + 1
    } else {
        width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(seed: u8) -> Digest {
        Digest::hash(&[seed])
    }

    fn leaves(n: u8) -> Vec<Digest> {
        (0..n).map(leaf).collect()
    }

    #[test]
    fn test_empty_tree_has_no_root() {
        assert_eq!(MerkleTree::from_leaves(&[]).unwrap().root(), None);
        assert_eq!(MerkleFrontier::new().root(), None);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let a = leaf(1);
        let tree = MerkleTree::from_leaves(&[a]).unwrap();
        assert_eq!(tree.root(), Some(a));
        assert_eq!(tree.proof(0), Some(vec![]));

        let mut frontier = MerkleFrontier::new();
        assert_eq!(frontier.push(a), (a, vec![]));
    }

    #[test]
    fn test_two_leaves() {
        let (a, b) = (leaf(1), leaf(2));
        let tree = MerkleTree::from_leaves(&[a, b]).unwrap();
        let root = Digest::combine(&a, &b);
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.proof(0), Some(vec![b]));
        assert_eq!(tree.proof(1), Some(vec![a]));
        assert!(verify_proof(&a, &[b], 0, &root));
        assert!(verify_proof(&b, &[a], 1, &root));
    }

    #[test]
    fn test_odd_node_is_duplicated() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let tree = MerkleTree::from_leaves(&[a, b, c]).unwrap();
        let ab = Digest::combine(&a, &b);
        let cc = Digest::combine(&c, &c);
        let root = Digest::combine(&ab, &cc);

        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.proof(2), Some(vec![c, ab]));
        assert!(verify_proof(&c, &[c, ab], 2, &root));
    }

    #[test]
    fn test_frontier_matches_full_rebuild() {
        let all = leaves(40);
        let mut frontier = MerkleFrontier::new();

        for (i, l) in all.iter().enumerate() {
            let (root, proof) = frontier.push(*l);
            let tree = MerkleTree::from_leaves(&all[..=i]).unwrap();

            assert_eq!(Some(root), tree.root(), "root after {} leaves", i + 1);
            assert_eq!(Some(root), frontier.root(), "peak root after {} leaves", i + 1);
            assert_eq!(Some(proof.clone()), tree.proof(i as u64), "proof of leaf {i}");
            assert!(verify_proof(l, &proof, i as u64, &root));
        }
        assert_eq!(frontier.len(), 40);
    }

    #[test]
    fn test_frontier_restore() {
        let all = leaves(13);
        let restored = MerkleFrontier::from_leaves(&all);
        assert_eq!(restored.root(), MerkleTree::from_leaves(&all).unwrap().root());
        assert_eq!(restored.len(), 13);
    }

    #[test]
    fn test_full_tree_proofs_verify_against_current_root() {
        let all = leaves(11);
        let tree = MerkleTree::from_leaves(&all).unwrap();
        for i in 0..all.len() as u64 {
            let proof = tree.inclusion_proof(i).unwrap();
            assert!(proof.verify(), "leaf {i}");
        }
        assert!(tree.proof(11).is_none());
    }

    #[test]
    fn test_tampered_sibling_fails() {
        let all = leaves(6);
        let tree = MerkleTree::from_leaves(&all).unwrap();
        let mut proof = tree.inclusion_proof(3).unwrap();
        proof.siblings[1].0[0] ^= 0x01;
        assert!(!proof.verify());
    }

    #[test]
    fn test_index_past_proof_depth_fails() {
        let all = leaves(4);
        let tree = MerkleTree::from_leaves(&all).unwrap();
        let mut proof = tree.inclusion_proof(1).unwrap();
        proof.leaf_index += 1 << 8;
        assert!(!proof.verify());
    }

    #[test]
    fn test_index_into_duplicated_slot_fails() {
        // Leaf 2 of 3 sits next to its own duplicate; claiming slot 3 must fail.
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let root = MerkleTree::from_leaves(&[a, b, c]).unwrap().root().unwrap();
        let ab = Digest::combine(&a, &b);
        assert!(verify_proof(&c, &[c, ab], 2, &root));
        assert!(!verify_proof(&c, &[c, ab], 3, &root));
    }

    #[test]
    fn test_proof_serde() {
        let tree = MerkleTree::from_leaves(&leaves(3)).unwrap();
        let proof = tree.inclusion_proof(0).unwrap();
        let json = serde_json::to_string(&proof).unwrap();
        let parsed: Proof = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, proof);
    }

    #[test]
    fn test_duplicate_leaves_rejected() {
        let (a, b) = (leaf(1), leaf(2));
        assert!(matches!(
            MerkleTree::from_leaves(&[a, b, a]),
            Err(CoreError::DuplicateLeaf { index: 2, .. })
        ));
        assert!(MerkleTree::from_leaves(&[a, a]).is_err());
    }

    #[test]
    fn test_equal_neighbours_fail_verification() {
        // [a, a]: the right-hand proof repeats the running hash.
        let a = leaf(1);
        let root = Digest::combine(&a, &a);
        assert!(verify_proof(&a, &[a], 0, &root));
        assert!(!verify_proof(&a, &[a], 1, &root));
    }

    #[test]
    fn test_level_width() {
        assert_eq!(level_width(5, 0), 5);
        assert_eq!(level_width(5, 1), 3);
        assert_eq!(level_width(5, 2), 2);
        assert_eq!(level_width(5, 3), 1);
        assert_eq!(level_width(4, 2), 1);
    }
}
