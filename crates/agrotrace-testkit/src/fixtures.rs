//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::BTreeMap;
use std::path::Path;

use agrotrace::{Ledger, LedgerConfig, Result};
use agrotrace_core::{
    BatchRecord, EventRecord, EventType, Keypair, Origin, PublicKey, Record, SignedRecord,
};
use agrotrace_store::{MemoryStore, SqliteStore};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// A producer identity with deterministic record builders.
pub struct TestFixture {
    pub keypair: Keypair,
    pub producer: String,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            producer: "coop-test".to_string(),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            producer: format!("coop-{:02x}", seed[0]),
        }
    }

    /// Get the keypair's public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Create a batch record harvested at the fixture epoch.
    pub fn make_batch(&self, batch_id: &str) -> Record {
        Record::Batch(BatchRecord {
            batch_id: batch_id.to_string(),
            product: "coffee".to_string(),
            variety: Some("caturra".to_string()),
            producer: self.producer.clone(),
            origin: Origin {
                farm: "finca-test".to_string(),
                region: Some("huila".to_string()),
            },
            quantity: 480.25,
            unit: "kg".to_string(),
            harvested_at: epoch(),
            attributes: BTreeMap::from([("grade".to_string(), "AA".to_string())]),
        })
    }

    /// Create an event record `hours` after the fixture epoch.
    pub fn make_event(
        &self,
        event_id: &str,
        batch_id: &str,
        event_type: EventType,
        hours: i64,
    ) -> Record {
        Record::Event(EventRecord {
            event_id: event_id.to_string(),
            batch_id: batch_id.to_string(),
            event_type,
            actor: self.producer.clone(),
            location: None,
            occurred_at: epoch() + Duration::hours(hours),
            details: BTreeMap::new(),
        })
    }

    /// Sign a record with the fixture's key.
    pub fn sign(&self, record: Record) -> SignedRecord {
        SignedRecord::sign(record, &self.keypair).expect("fixture records canonicalize")
    }

    /// A signed batch record.
    pub fn signed_batch(&self, batch_id: &str) -> SignedRecord {
        self.sign(self.make_batch(batch_id))
    }
}

/// Fixed reference time for fixture records.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
        .single()
        .expect("valid fixture epoch")
}

/// An empty ledger over an in-memory store.
pub async fn memory_ledger() -> Result<Ledger<MemoryStore>> {
    memory_ledger_with(LedgerConfig::default()).await
}

/// An empty in-memory ledger with a custom configuration.
pub async fn memory_ledger_with(config: LedgerConfig) -> Result<Ledger<MemoryStore>> {
    Ledger::open(MemoryStore::new(), config).await
}

/// A ledger over a SQLite file at `path`.
pub async fn sqlite_ledger(path: impl AsRef<Path>) -> Result<Ledger<SqliteStore>> {
    Ledger::open(SqliteStore::open(path)?, LedgerConfig::default()).await
}

/// Create multiple fixtures for multi-producer tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[1] = 0x5a;
            TestFixture::with_seed(seed)
        })
        .collect()
}
