//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use nodechain_core::{Block, BlockHash};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{InsertResult, Store};

const SELECT_COLUMNS: &str = "block_index, prev_hash, kind, timestamp, payload, nonce, hash";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. The mutex also serializes writers,
/// so the occupied-index check and the insert are atomic.
#[derive(Clone)]
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
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
        tracing::debug!(path = %path.display(), "opened block store");
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

    /// Run `f` against the locked connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn to_sql_int(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{} {} exceeds SQLite integer range", what, value)))
}

fn encode_payload(payload: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(payload, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

// Helper to convert a row to Block
fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    let index: i64 = row.get("block_index")?;
    let nonce: i64 = row.get("nonce")?;
    let payload_cbor: Vec<u8> = row.get("payload")?;

    let payload: Value = ciborium::from_reader(&payload_cbor[..]).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Blob,
            e.to_string().into(),
        )
    })?;

    Ok(Block {
        index: index as u64,
        previous_hash: BlockHash::from(row.get::<_, String>("prev_hash")?),
        kind: row.get("kind")?,
        timestamp: row.get("timestamp")?,
        payload,
        nonce: nonce as u64,
        hash: BlockHash::from(row.get::<_, String>("hash")?),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_block(&self, block: &Block) -> Result<InsertResult> {
        let index = to_sql_int(block.index, "index")?;
        let nonce = to_sql_int(block.nonce, "nonce")?;
        let payload = encode_payload(&block.payload)?;
        let block = block.clone();

        self.blocking(move |conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT hash FROM blocks WHERE block_index = ?1",
                    params![index],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                if existing == block.hash.as_str() {
                    return Ok(InsertResult::AlreadyExists);
                }
                return Ok(InsertResult::Conflict {
                    existing: BlockHash::from(existing),
                });
            }

            conn.execute(
                "INSERT INTO blocks (
                    block_index, prev_hash, kind, timestamp, payload, nonce, hash, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    index,
                    block.previous_hash.as_str(),
                    block.kind,
                    block.timestamp,
                    payload,
                    nonce,
                    block.hash.as_str(),
                    now_millis(),
                ],
            )?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_block(&self, index: u64) -> Result<Option<Block>> {
        let Ok(index) = i64::try_from(index) else {
            return Ok(None);
        };

        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM blocks WHERE block_index = ?1", SELECT_COLUMNS),
                params![index],
                row_to_block,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_latest(&self) -> Result<Option<Block>> {
        self.blocking(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM blocks ORDER BY block_index DESC LIMIT 1",
                    SELECT_COLUMNS
                ),
                [],
                row_to_block,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_range(&self, start: u64, end: u64) -> Result<Vec<Block>> {
        let start = i64::try_from(start).unwrap_or(i64::MAX);
        let end = i64::try_from(end).unwrap_or(i64::MAX);

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM blocks WHERE block_index >= ?1 AND block_index <= ?2
                 ORDER BY block_index",
                SELECT_COLUMNS
            ))?;

            let blocks = stmt
                .query_map(params![start, end], row_to_block)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(blocks)
        })
        .await
    }

    async fn get_all(&self) -> Result<Vec<Block>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM blocks ORDER BY block_index",
                SELECT_COLUMNS
            ))?;

            let blocks = stmt
                .query_map([], row_to_block)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(blocks)
        })
        .await
    }

    async fn has_block(&self, index: u64) -> Result<bool> {
        let Ok(index) = i64::try_from(index) else {
            return Ok(false);
        };

        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM blocks WHERE block_index = ?1)",
                params![index],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.blocking(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}
