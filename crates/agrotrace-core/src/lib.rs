//! # AgroTrace Core
//!
//! Pure primitives for the AgroTrace ledger: digests, canonical records,
//! signatures and Merkle proofs.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! safe to call from any number of threads without synchronization.
//!
//! ## Key Types
//!
//! - [`Record`] - Closed set of ledger payloads (batch, event, anchor)
//! - [`Digest`] - 32-byte BLAKE3 digest, hex at serde boundaries
//! - [`Leaf`] - A record's hash, position, proof and insertion root
//! - [`Proof`] - Self-contained inclusion claim, see [`verify_proof`]
//! - [`MerkleFrontier`] - O(log N) incremental accumulator
//!
//! ## Canonicalization
//!
//! Records are hashed over deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod digest;
pub mod error;
pub mod leaf;
pub mod merkle;
pub mod record;

pub use canonical::{canonical_digest, canonicalize};
pub use crypto::{
    generate_keypair, sign, sign_hex, verify, verify_hex, Keypair, PublicKey, Signature,
};
pub use digest::{combine, digest, Digest, DIGEST_LEN};
pub use error::{CoreError, Result};
pub use leaf::Leaf;
pub use merkle::{verify_proof, MerkleFrontier, MerkleTree, Proof};
pub use record::{
    AnchorRequest, BatchRecord, EventRecord, EventType, Origin, Record, RecordKind, SignedRecord,
};
