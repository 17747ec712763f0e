//! SQLite implementation of the MiniblockStore trait.
//!
//! The persistent miniblock cache. Uses rusqlite with bundled SQLite, wrapped
//! in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use river_stream_core::types::now_epoch_ms;
use river_stream_core::{EventHash, Miniblock, StreamId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{miniblock_hash, InsertResult, MiniblockStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

fn encode_miniblock(miniblock: &Miniblock) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(miniblock, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_miniblock(data: &[u8]) -> Result<Miniblock> {
    ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode_hash(bytes: Vec<u8>) -> Result<EventHash> {
    EventHash::try_from(bytes.as_slice()).map_err(|_| {
        StoreError::InvalidData(format!("stored header hash has {} bytes", bytes.len()))
    })
}

/// Insert one encoded miniblock, checking what is already at its number.
fn insert_encoded(
    conn: &Connection,
    stream_id: &StreamId,
    miniblock_num: u64,
    hash: &EventHash,
    data: &[u8],
    now: i64,
) -> Result<InsertResult> {
    let existing: Option<Vec<u8>> = conn
        .query_row(
            "SELECT header_hash FROM miniblocks WHERE stream_id = ?1 AND miniblock_num = ?2",
            params![stream_id.as_bytes().as_slice(), miniblock_num as i64],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(existing) = existing {
        let existing = decode_hash(existing)?;
        if existing == *hash {
            return Ok(InsertResult::AlreadyExists);
        }
        return Ok(InsertResult::Conflict { existing });
    }

    conn.execute(
        "INSERT INTO miniblocks (stream_id, miniblock_num, header_hash, data, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            stream_id.as_bytes().as_slice(),
            miniblock_num as i64,
            hash.as_bytes().as_slice(),
            data,
            now,
        ],
    )?;

    Ok(InsertResult::Inserted)
}

#[async_trait]
impl MiniblockStore for SqliteStore {
    async fn save_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
        miniblock: &Miniblock,
    ) -> Result<InsertResult> {
        let stream_id = *stream_id;
        let hash = miniblock_hash(miniblock)?;
        let data = encode_miniblock(miniblock)?;

        self.blocking(move |conn| {
            insert_encoded(conn, &stream_id, miniblock_num, &hash, &data, now_epoch_ms())
        })
        .await
    }

    async fn save_miniblocks(
        &self,
        stream_id: &StreamId,
        miniblocks: &[(u64, Miniblock)],
    ) -> Result<usize> {
        let stream_id = *stream_id;
        let encoded = miniblocks
            .iter()
            .map(|(num, mb)| Ok((*num, miniblock_hash(mb)?, encode_miniblock(mb)?)))
            .collect::<Result<Vec<_>>>()?;

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = now_epoch_ms();
            let mut inserted = 0;
            for (num, hash, data) in &encoded {
                if insert_encoded(&tx, &stream_id, *num, hash, data, now)?
                    == InsertResult::Inserted
                {
                    inserted += 1;
                }
            }
            tx.commit()?;
            debug!(stream_id = %stream_id, inserted, total = encoded.len(), "saved miniblocks");
            Ok(inserted)
        })
        .await
    }

    async fn get_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
    ) -> Result<Option<Miniblock>> {
        let stream_id = *stream_id;

        self.blocking(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM miniblocks WHERE stream_id = ?1 AND miniblock_num = ?2",
                    params![stream_id.as_bytes().as_slice(), miniblock_num as i64],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(|d| decode_miniblock(&d)).transpose()
        })
        .await
    }

    async fn get_miniblocks_range(
        &self,
        stream_id: &StreamId,
        from_inclusive: u64,
        to_exclusive: u64,
    ) -> Result<Vec<(u64, Miniblock)>> {
        if from_inclusive >= to_exclusive {
            return Ok(Vec::new());
        }
        let stream_id = *stream_id;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT miniblock_num, data FROM miniblocks
                 WHERE stream_id = ?1 AND miniblock_num >= ?2 AND miniblock_num < ?3
                 ORDER BY miniblock_num ASC",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        stream_id.as_bytes().as_slice(),
                        from_inclusive as i64,
                        to_exclusive as i64
                    ],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(num, data)| Ok((num as u64, decode_miniblock(&data)?)))
                .collect()
        })
        .await
    }

    async fn miniblock_bounds(&self, stream_id: &StreamId) -> Result<Option<(u64, u64)>> {
        let stream_id = *stream_id;

        self.blocking(move |conn| {
            let bounds: (Option<i64>, Option<i64>) = conn.query_row(
                "SELECT MIN(miniblock_num), MAX(miniblock_num) FROM miniblocks WHERE stream_id = ?1",
                params![stream_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(match bounds {
                (Some(min), Some(max)) => Some((min as u64, max as u64)),
                _ => None,
            })
        })
        .await
    }

    async fn delete_stream(&self, stream_id: &StreamId) -> Result<usize> {
        let stream_id = *stream_id;

        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM miniblocks WHERE stream_id = ?1",
                params![stream_id.as_bytes().as_slice()],
            )?;
            Ok(removed)
        })
        .await
    }
}
