//! Store trait: the abstract interface for miniblock persistence.
//!
//! Miniblocks are kept in their wire form, keyed by (stream id, miniblock
//! number), so a cache hit can be verified again exactly as if it had come
//! from a node.

use async_trait::async_trait;
use river_stream_core::{
    unpack_miniblock, EventHash, Miniblock, ParsedMiniblock, StreamId, UnpackOptions,
};

use crate::error::{Result, StoreError};

/// Result of saving a miniblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Miniblock was saved.
    Inserted,
    /// The same miniblock is already stored (idempotent - not an error).
    AlreadyExists,
    /// A different miniblock is stored at this number.
    Conflict {
        /// Header hash of the stored miniblock.
        existing: EventHash,
    },
}

/// The header hash of a wire miniblock.
pub fn miniblock_hash(miniblock: &Miniblock) -> Result<EventHash> {
    let header = miniblock
        .header
        .as_ref()
        .ok_or_else(|| StoreError::InvalidData("miniblock header is not set".into()))?;
    EventHash::try_from(header.hash.as_ref()).map_err(|_| {
        StoreError::InvalidData(format!(
            "miniblock hash should be 32 bytes, got {}",
            header.hash.len()
        ))
    })
}

/// Async interface for miniblock persistence.
///
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
#[async_trait]
pub trait MiniblockStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Miniblock Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Save a miniblock at its number.
    ///
    /// # Returns
    /// - `Inserted` if nothing was stored at this number.
    /// - `AlreadyExists` if the same miniblock is stored.
    /// - `Conflict` if a miniblock with a different header hash is stored.
    async fn save_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
        miniblock: &Miniblock,
    ) -> Result<InsertResult>;

    /// Save a batch of numbered miniblocks. Returns how many were new.
    async fn save_miniblocks(
        &self,
        stream_id: &StreamId,
        miniblocks: &[(u64, Miniblock)],
    ) -> Result<usize>;

    /// Get a miniblock by number.
    async fn get_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
    ) -> Result<Option<Miniblock>>;

    /// Get stored miniblocks with `from_inclusive <= num < to_exclusive`, ordered by number.
    ///
    /// Missing numbers are skipped.
    async fn get_miniblocks_range(
        &self,
        stream_id: &StreamId,
        from_inclusive: u64,
        to_exclusive: u64,
    ) -> Result<Vec<(u64, Miniblock)>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Stream Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Lowest and highest stored miniblock numbers for a stream.
    async fn miniblock_bounds(&self, stream_id: &StreamId) -> Result<Option<(u64, u64)>>;

    /// Drop everything stored for a stream. Returns the number of miniblocks removed.
    async fn delete_stream(&self, stream_id: &StreamId) -> Result<usize>;
}

/// Extension trait for common store patterns.
pub trait MiniblockStoreExt: MiniblockStore {
    /// Load a stored miniblock and verify it.
    fn get_parsed_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
        opts: &UnpackOptions,
    ) -> impl std::future::Future<Output = Result<Option<ParsedMiniblock>>> + Send;
}

impl<S: MiniblockStore + ?Sized> MiniblockStoreExt for S {
    async fn get_parsed_miniblock(
        &self,
        stream_id: &StreamId,
        miniblock_num: u64,
        opts: &UnpackOptions,
    ) -> Result<Option<ParsedMiniblock>> {
        let Some(miniblock) = self.get_miniblock(stream_id, miniblock_num).await? else {
            return Ok(None);
        };
        let parsed = unpack_miniblock(&miniblock, opts)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        if parsed.miniblock_num() != miniblock_num {
            return Err(StoreError::InvalidData(format!(
                "miniblock stored at {} has number {}",
                miniblock_num,
                parsed.miniblock_num()
            )));
        }
        Ok(Some(parsed))
    }
}
