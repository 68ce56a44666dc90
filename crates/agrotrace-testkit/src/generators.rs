//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use agrotrace_core::{BatchRecord, Digest, EventRecord, EventType, Keypair, Origin, Record};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random digest.
pub fn digest() -> impl Strategy<Value = Digest> {
    any::<[u8; 32]>().prop_map(Digest::from_bytes)
}

/// Generate `1..=max` distinct leaf hashes.
pub fn distinct_leaves(max: usize) -> impl Strategy<Value = Vec<Digest>> {
    prop::collection::btree_set(any::<[u8; 32]>(), 1..=max)
        .prop_map(|set| set.into_iter().map(Digest::from_bytes).collect())
}

/// Generate an identifier.
pub fn ident() -> impl Strategy<Value = String> {
    "[A-Z]{1,3}-[0-9]{1,6}".prop_map(String::from)
}

/// Generate a timestamp with millisecond precision.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..=4_102_444_800_000i64)
        .prop_map(|ms| DateTime::from_timestamp_millis(ms).unwrap_or_default())
}

/// Generate a free-form attribute map.
pub fn attributes() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z_]{1,12}", "[ -~]{0,24}", 0..6)
}

/// Generate an event type.
pub fn event_type() -> impl Strategy<Value = EventType> {
    prop_oneof![
        Just(EventType::Harvested),
        Just(EventType::Processed),
        Just(EventType::Packaged),
        Just(EventType::Shipped),
        Just(EventType::Received),
        Just(EventType::Inspected),
        Just(EventType::Stored),
        Just(EventType::Sold),
        "[a-z]{1,12}".prop_map(EventType::Other),
    ]
}

/// Generate a valid batch record.
pub fn batch_record() -> impl Strategy<Value = BatchRecord> {
    (
        ident(),
        "[a-z]{3,10}",
        prop::option::of("[a-z]{3,10}"),
        ident(),
        ("[a-z-]{3,16}", prop::option::of("[a-z]{3,10}")),
        0.0f64..1_000_000.0,
        prop_oneof![Just("kg"), Just("t"), Just("crates")],
        timestamp(),
        attributes(),
    )
        .prop_map(
            |(batch_id, product, variety, producer, (farm, region), quantity, unit, at, attrs)| {
                BatchRecord {
                    batch_id,
                    product,
                    variety,
                    producer,
                    origin: Origin { farm, region },
                    quantity,
                    unit: unit.to_string(),
                    harvested_at: at,
                    attributes: attrs,
                }
            },
        )
}

/// Generate a valid event record.
pub fn event_record() -> impl Strategy<Value = EventRecord> {
    (
        ident(),
        ident(),
        event_type(),
        ident(),
        prop::option::of("[a-z-]{3,16}"),
        timestamp(),
        attributes(),
    )
        .prop_map(
            |(event_id, batch_id, event_type, actor, location, occurred_at, details)| {
                EventRecord {
                    event_id,
                    batch_id,
                    event_type,
                    actor,
                    location,
                    occurred_at,
                    details,
                }
            },
        )
}

/// Generate a batch or event record.
pub fn record() -> impl Strategy<Value = Record> {
    prop_oneof![
        batch_record().prop_map(Record::Batch),
        event_record().prop_map(Record::Event),
    ]
}

/// Flip one bit of one byte.
pub fn flip(digest: &Digest, byte: usize, bit: u8) -> Digest {
    let mut bytes = digest.0;
    bytes[byte % 32] ^= 1 << (bit % 8);
    Digest::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrotrace_core::{canonicalize, crypto, verify_proof, MerkleFrontier, MerkleTree};
    use std::collections::HashMap;

    proptest! {
        // Every stored proof verifies against the root at its insertion.
        #[test]
        fn test_proof_soundness(leaves in distinct_leaves(64)) {
            let mut frontier = MerkleFrontier::new();
            for (i, leaf) in leaves.iter().enumerate() {
                let (root, proof) = frontier.push(*leaf);
                prop_assert!(verify_proof(leaf, &proof, i as u64, &root));
                let rebuilt = MerkleTree::from_leaves(&leaves[..=i]).unwrap();
                prop_assert_eq!(Some(root), rebuilt.root());
            }
        }

        // Any single-byte change to leaf, sibling, index or root is detected.
        #[test]
        fn test_tamper_detection(
            leaves in distinct_leaves(40),
            pick in any::<prop::sample::Index>(),
            byte in 0usize..32,
            bit in 0u8..8,
            index_byte in 0usize..8,
            index_xor in 1u8..=255,
        ) {
            let tree = MerkleTree::from_leaves(&leaves).unwrap();
            let index = pick.index(leaves.len());
            let proof = tree.inclusion_proof(index as u64).unwrap();
            prop_assert!(proof.verify());

            let mut p = proof.clone();
            p.leaf = flip(&p.leaf, byte, bit);
            prop_assert!(!p.verify());

            let mut p = proof.clone();
            p.root = flip(&p.root, byte, bit);
            prop_assert!(!p.verify());

            if !proof.siblings.is_empty() {
                let mut p = proof.clone();
                let s = byte % p.siblings.len();
                p.siblings[s] = flip(&p.siblings[s], byte, bit);
                prop_assert!(!p.verify());
            }

            let mut p = proof.clone();
            let mut index_bytes = p.leaf_index.to_le_bytes();
            index_bytes[index_byte] ^= index_xor;
            p.leaf_index = u64::from_le_bytes(index_bytes);
            prop_assert!(!p.verify());
        }

        #[test]
        fn test_repeated_leaf_refused(
            leaves in distinct_leaves(20),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut repeated = leaves.clone();
            repeated.push(leaves[pick.index(leaves.len())]);
            prop_assert!(MerkleTree::from_leaves(&repeated).is_err());
        }

        // Construction order never changes canonical bytes.
        #[test]
        fn test_canonicalization_order_independent(
            entries in prop::collection::vec(("[a-z]{1,8}", any::<i64>()), 0..24),
        ) {
            let mut forward = HashMap::new();
            for (k, v) in &entries {
                forward.entry(k.clone()).or_insert(*v);
            }
            let mut backward = HashMap::new();
            for (k, _) in entries.iter().rev() {
                backward.insert(k.clone(), forward[k]);
            }
            prop_assert_eq!(canonicalize(&forward).unwrap(), canonicalize(&backward).unwrap());
        }

        #[test]
        fn test_record_hash_deterministic(record in record()) {
            let again = record.clone();
            prop_assert_eq!(record.leaf_hash().unwrap(), again.leaf_hash().unwrap());
            prop_assert!(record.validate().is_ok());
        }

        // Signatures round-trip and break on any alteration.
        #[test]
        fn test_signature_roundtrip(
            signer in keypair(),
            other in keypair(),
            message in prop::collection::vec(any::<u8>(), 0..256),
            byte in any::<prop::sample::Index>(),
        ) {
            let public_key = signer.public_key();
            let signature = crypto::sign(&message, &signer);
            prop_assert!(crypto::verify(&message, &signature, &public_key));

            let mut altered = message.clone();
            if altered.is_empty() {
                altered.push(0);
            } else {
                let i = byte.index(altered.len());
                altered[i] ^= 0x01;
            }
            prop_assert!(!crypto::verify(&altered, &signature, &public_key));

            let mut bad_sig = signature;
            bad_sig.0[byte.index(64)] ^= 0x01;
            prop_assert!(!crypto::verify(&message, &bad_sig, &public_key));

            prop_assume!(other.public_key() != public_key);
            prop_assert!(!crypto::verify(&message, &signature, &other.public_key()));
        }
    }
}
