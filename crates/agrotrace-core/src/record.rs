//! Records: the typed payloads that become ledger leaves.
//!
//! A record is immutable once hashed. Its leaf hash is
//! `digest(canonicalize(record))`, and the `kind` tag is part of the hashed
//! bytes, so a batch and an event with identical fields never collide.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::{canonical_digest, canonicalize, iso8601};
use crate::crypto::{self, Keypair, PublicKey, Signature};
use crate::digest::Digest;
use crate::error::{CoreError, Result};

/// The kind of record stored in a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum RecordKind {
    /// Batch creation.
    Batch = 0x0001,
    /// Timeline event on an existing batch.
    Event = 0x0002,
    /// Request to anchor a ledger root externally.
    Anchor = 0x0003,
}

impl RecordKind {
    /// Convert to u16 for storage.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Batch),
            0x0002 => Some(Self::Event),
            0x0003 => Some(Self::Anchor),
            _ => None,
        }
    }

    /// Lowercase name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Event => "event",
            Self::Anchor => "anchor",
        }
    }
}

/// Where a batch was grown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub farm: String,
    pub region: Option<String>,
}

/// Creation data for an agricultural batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: String,
    pub product: String,
    pub variety: Option<String>,
    pub producer: String,
    pub origin: Origin,
    pub quantity: f64,
    pub unit: String,
    #[serde(with = "iso8601")]
    pub harvested_at: DateTime<Utc>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// What happened to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Harvested,
    Processed,
    Packaged,
    Shipped,
    Received,
    Inspected,
    Stored,
    Sold,
    Other(String),
}

/// A timeline event on a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub batch_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub location: Option<String>,
    #[serde(with = "iso8601")]
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

/// A request to anchor a ledger root with an external timestamping service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRequest {
    pub root: Digest,
    pub leaf_count: u64,
    #[serde(with = "iso8601")]
    pub requested_at: DateTime<Utc>,
    pub external_ref: Option<String>,
}

/// A ledger record. The `kind` tag is part of the canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Record {
    Batch(BatchRecord),
    Event(EventRecord),
    Anchor(AnchorRequest),
}

impl Record {
    /// The record's kind tag.
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Batch(_) => RecordKind::Batch,
            Record::Event(_) => RecordKind::Event,
            Record::Anchor(_) => RecordKind::Anchor,
        }
    }

    /// The batch this record belongs to, if any.
    pub fn batch_id(&self) -> Option<&str> {
        match self {
            Record::Batch(b) => Some(&b.batch_id),
            Record::Event(e) => Some(&e.batch_id),
            Record::Anchor(_) => None,
        }
    }

    /// The event id, for event records.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Record::Event(e) => Some(&e.event_id),
            _ => None,
        }
    }

    /// Canonical bytes of this record.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonicalize(self)
    }

    /// `digest(canonicalize(self))`.
    pub fn leaf_hash(&self) -> Result<Digest> {
        canonical_digest(self)
    }

    /// Structural checks. A record that fails here is never hashed.
    pub fn validate(&self) -> Result<()> {
        match self {
            Record::Batch(b) => {
                require_non_empty("batch_id", &b.batch_id)?;
                require_non_empty("product", &b.product)?;
                require_non_empty("producer", &b.producer)?;
                require_non_empty("origin.farm", &b.origin.farm)?;
                require_non_empty("unit", &b.unit)?;
                if !b.quantity.is_finite() || b.quantity < 0.0 {
                    return Err(CoreError::InvalidRecord(format!(
                        "quantity must be a non-negative number, got {}",
                        b.quantity
                    )));
                }
            }
            Record::Event(e) => {
                require_non_empty("event_id", &e.event_id)?;
                require_non_empty("batch_id", &e.batch_id)?;
                require_non_empty("actor", &e.actor)?;
                if let EventType::Other(name) = &e.event_type {
                    require_non_empty("event_type", name)?;
                }
            }
            Record::Anchor(a) => {
                if a.leaf_count == 0 {
                    return Err(CoreError::InvalidRecord(
                        "anchor must cover at least one leaf".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoreError::InvalidRecord(format!("{field} must not be empty")));
    }
    Ok(())
}

/// A record together with its author's signature.
///
/// The signed message is `canonicalize(record)`. The signature and public
/// key are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedRecord {
    pub record: Record,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl SignedRecord {
    /// Sign a record.
    pub fn sign(record: Record, keypair: &Keypair) -> Result<Self> {
        let message = record.canonical_bytes()?;
        let signature = keypair.sign(&message);
        Ok(Self {
            record,
            public_key: keypair.public_key(),
            signature,
        })
    }

    /// Rebuild the exact message the signer signed.
    pub fn signed_message(&self) -> Result<Vec<u8>> {
        self.record.canonical_bytes()
    }

    /// Check the signature. Never errors; anything malformed is `false`.
    pub fn verify_signature(&self) -> bool {
        match self.signed_message() {
            Ok(message) => crypto::verify(&message, &self.signature, &self.public_key),
            Err(_) => false,
        }
    }
}
