//! SQLite implementation of the LeafStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use agrotrace_core::{Digest, Leaf, RecordKind, DIGEST_LEN};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, LeafStore};

const LEAF_COLUMNS: &str =
    "leaf_index, leaf_hash, kind, batch_id, event_id, root, proof, appended_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.display(), "opened leaf store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

/// Raw column values, decoded into a [`Leaf`] outside the row callback.
struct LeafRow {
    index: i64,
    hash: Vec<u8>,
    kind: u16,
    batch_id: Option<String>,
    event_id: Option<String>,
    root: Vec<u8>,
    proof: Vec<u8>,
    appended_at: i64,
}

impl LeafRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            index: row.get("leaf_index")?,
            hash: row.get("leaf_hash")?,
            kind: row.get("kind")?,
            batch_id: row.get("batch_id")?,
            event_id: row.get("event_id")?,
            root: row.get("root")?,
            proof: row.get("proof")?,
            appended_at: row.get("appended_at")?,
        })
    }

    fn into_leaf(self) -> Result<Leaf> {
        let index = u64::try_from(self.index)
            .map_err(|_| StoreError::InvalidData(format!("negative leaf index {}", self.index)))?;
        let kind = RecordKind::from_u16(self.kind)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown record kind {}", self.kind)))?;
        let appended_at = DateTime::<Utc>::from_timestamp_millis(self.appended_at).ok_or_else(
            || StoreError::InvalidData(format!("timestamp out of range: {}", self.appended_at)),
        )?;

        Ok(Leaf {
            index,
            hash: decode_digest(&self.hash, "leaf_hash")?,
            kind,
            batch_id: self.batch_id,
            event_id: self.event_id,
            root: decode_digest(&self.root, "root")?,
            proof: decode_proof(&self.proof)?,
            appended_at,
        })
    }
}

fn decode_digest(bytes: &[u8], column: &str) -> Result<Digest> {
    Digest::try_from(bytes).map_err(|e| StoreError::InvalidData(format!("{column}: {e}")))
}

/// Proofs are stored as concatenated 32-byte siblings.
fn encode_proof(proof: &[Digest]) -> Vec<u8> {
    proof.iter().flat_map(|d| d.0).collect()
}

fn decode_proof(bytes: &[u8]) -> Result<Vec<Digest>> {
    if bytes.len() % DIGEST_LEN != 0 {
        return Err(StoreError::Serialization(format!(
            "proof blob of {} bytes is not a whole number of digests",
            bytes.len()
        )));
    }
    bytes
        .chunks_exact(DIGEST_LEN)
        .map(|chunk| decode_digest(chunk, "proof"))
        .collect()
}

fn query_one(conn: &Connection, filter: &str, param: &dyn rusqlite::ToSql) -> Result<Option<Leaf>> {
    let sql = format!("SELECT {LEAF_COLUMNS} FROM leaves {filter}");
    conn.query_row(&sql, [param], LeafRow::from_row)
        .optional()?
        .map(LeafRow::into_leaf)
        .transpose()
}

fn query_many(conn: &Connection, filter: &str, param: &dyn rusqlite::ToSql) -> Result<Vec<Leaf>> {
    let sql = format!("SELECT {LEAF_COLUMNS} FROM leaves {filter} ORDER BY leaf_index");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([param], LeafRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(LeafRow::into_leaf).collect()
}

#[async_trait]
impl LeafStore for SqliteStore {
    async fn insert_leaf(&self, leaf: &Leaf) -> Result<InsertResult> {
        let leaf = leaf.clone();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let index = leaf.index as i64;

            let existing_at_index: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT leaf_hash FROM leaves WHERE leaf_index = ?1",
                    params![index],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(bytes) = existing_at_index {
                return Ok(InsertResult::Conflict {
                    existing: decode_digest(&bytes, "leaf_hash")?,
                });
            }

            let existing_by_hash: Option<i64> = tx
                .query_row(
                    "SELECT leaf_index FROM leaves WHERE leaf_hash = ?1",
                    params![leaf.hash.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing_index) = existing_by_hash {
                return Ok(InsertResult::DuplicateHash {
                    existing_index: existing_index as u64,
                });
            }

            let count: i64 = tx.query_row("SELECT COUNT(*) FROM leaves", [], |row| row.get(0))?;
            if index != count {
                return Err(StoreError::InvalidData(format!(
                    "leaf index {index} would leave a gap after {count} leaves"
                )));
            }

            tx.execute(
                "INSERT INTO leaves (
                    leaf_index, leaf_hash, kind, batch_id, event_id, root, proof, appended_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    index,
                    leaf.hash.as_bytes().as_slice(),
                    leaf.kind.to_u16(),
                    leaf.batch_id,
                    leaf.event_id,
                    leaf.root.as_bytes().as_slice(),
                    encode_proof(&leaf.proof),
                    leaf.appended_at.timestamp_millis(),
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_leaf(&self, index: u64) -> Result<Option<Leaf>> {
        let Ok(index) = i64::try_from(index) else {
            return Ok(None);
        };
        self.with_conn(move |conn| query_one(conn, "WHERE leaf_index = ?1", &index))
            .await
    }

    async fn get_leaf_by_hash(&self, hash: &Digest) -> Result<Option<Leaf>> {
        let hash = hash.0.to_vec();
        self.with_conn(move |conn| query_one(conn, "WHERE leaf_hash = ?1", &hash))
            .await
    }

    async fn latest_leaf(&self) -> Result<Option<Leaf>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {LEAF_COLUMNS} FROM leaves ORDER BY leaf_index DESC LIMIT 1");
            conn.query_row(&sql, [], LeafRow::from_row)
                .optional()?
                .map(LeafRow::into_leaf)
                .transpose()
        })
        .await
    }

    async fn leaf_count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM leaves", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn leaves_for_batch(&self, batch_id: &str) -> Result<Vec<Leaf>> {
        let batch_id = batch_id.to_string();
        self.with_conn(move |conn| query_many(conn, "WHERE batch_id = ?1", &batch_id))
            .await
    }

    async fn leaves_for_event(&self, event_id: &str) -> Result<Vec<Leaf>> {
        let event_id = event_id.to_string();
        self.with_conn(move |conn| query_many(conn, "WHERE event_id = ?1", &event_id))
            .await
    }

    async fn leaf_hashes(&self) -> Result<Vec<(u64, Digest)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT leaf_index, leaf_hash FROM leaves ORDER BY leaf_index")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter()
                .map(|(index, hash)| Ok((index as u64, decode_digest(&hash, "leaf_hash")?)))
                .collect()
        })
        .await
    }
}
