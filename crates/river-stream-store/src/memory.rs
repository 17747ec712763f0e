//! In-memory implementation of the MiniblockStore trait.
//!
//! Same semantics as SQLite but nothing survives the process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use river_stream_core::{EventHash, Miniblock, StreamId};

use crate::error::{Result, StoreError};
use crate::traits::{miniblock_hash, InsertResult, MiniblockStore};

/// In-memory store implementation.
///
/// Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Miniblocks per stream, ordered by number.
    streams: HashMap<StreamId, BTreeMap<u64, StoredMiniblock>>,
}

struct StoredMiniblock {
    hash: EventHash,
    miniblock: Miniblock,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn insert(
        &mut self,
        stream_id: &StreamId,
        miniblock_num: u64,
        miniblock: &Miniblock,
    ) -> Result<InsertResult> {
        let hash = miniblock_hash(miniblock)?;
        let blocks = self.streams.entry(*stream_id).or_default();

        if let Some(existing) = blocks.get(&miniblock_num) {
            if existing.hash == hash {
                return Ok(InsertResult::AlreadyExists);
            }
            return Ok(InsertResult::Conflict {
                existing: existing.hash,
            });
        }

        blocks.insert(
            miniblock_num,
            StoredMiniblock {
                hash,
                miniblock: miniblock.clone(),
            },
        );
        Ok(InsertResult::Inserted)
    }
}

#[async_trait]
impl MiniblockStore for MemoryStore {
    async fn save_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
        miniblock: &Miniblock,
    ) -> Result<InsertResult> {
        self.write()?.insert(stream_id, miniblock_num, miniblock)
    }

    async fn save_miniblocks(
        &self,
        stream_id: &StreamId,
        miniblocks: &[(u64, Miniblock)],
    ) -> Result<usize> {
        // Validate the whole batch first so a bad block leaves nothing behind.
        for (_, mb) in miniblocks {
            miniblock_hash(mb)?;
        }

        let mut inner = self.write()?;
        let mut inserted = 0;
        for (num, mb) in miniblocks {
            if inner.insert(stream_id, *num, mb)? == InsertResult::Inserted {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
    ) -> Result<Option<Miniblock>> {
        let inner = self.read()?;
        Ok(inner
            .streams
            .get(stream_id)
            .and_then(|blocks| blocks.get(&miniblock_num))
            .map(|stored| stored.miniblock.clone()))
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
        let inner = self.read()?;
        Ok(inner
            .streams
            .get(stream_id)
            .map(|blocks| {
                blocks
                    .range(from_inclusive..to_exclusive)
                    .map(|(num, stored)| (*num, stored.miniblock.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn miniblock_bounds(&self, stream_id: &StreamId) -> Result<Option<(u64, u64)>> {
        let inner = self.read()?;
        Ok(inner.streams.get(stream_id).and_then(|blocks| {
            let first = blocks.keys().next()?;
            let last = blocks.keys().next_back()?;
            Some((*first, *last))
        }))
    }

    async fn delete_stream(&self, stream_id: &StreamId) -> Result<usize> {
        let mut inner = self.write()?;
        Ok(inner
            .streams
            .remove(stream_id)
            .map(|blocks| blocks.len())
            .unwrap_or(0))
    }
}
