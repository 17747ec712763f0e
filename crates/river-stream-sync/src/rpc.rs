//! Node RPC abstraction.
//!
//! Only the two reads the stream client needs: a full stream from its latest
//! snapshot, and a page of older miniblocks.

use async_trait::async_trait;

use river_stream_core::{Miniblock, StreamAndCookie, StreamId};

use crate::error::Result;

/// A page of wire miniblocks, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMiniblocksResponse {
    pub miniblocks: Vec<Miniblock>,
    /// Whether the page starts at the genesis miniblock.
    pub terminus: bool,
}

/// Read access to a River node.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StreamRpc: Send + Sync {
    /// Fetch a stream from its latest snapshot miniblock, plus the minipool.
    async fn get_stream(&self, stream_id: &StreamId) -> Result<StreamAndCookie>;

    /// Fetch miniblocks numbered `from_inclusive..to_exclusive`.
    async fn get_miniblocks(
        &self,
        stream_id: &StreamId,
        from_inclusive: u64,
        to_exclusive: u64,
    ) -> Result<GetMiniblocksResponse>;
}

/// An in-memory node for testing.
///
/// Serves stored wire miniblocks, counts page requests and can hold page
/// requests in flight until released.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use river_stream_core::{
        unpack_miniblock, Envelope, EventHash, SyncCookie, UnpackOptions,
    };
    use tokio::sync::{Mutex, Notify, RwLock, Semaphore};

    use crate::error::SyncError;

    struct NodeStream {
        miniblocks: Vec<Miniblock>,
        minipool: Vec<Envelope>,
        /// Number of the latest miniblock carrying a snapshot.
        snapshot_num: u64,
        last_hash: Option<EventHash>,
    }

    /// In-memory [`StreamRpc`] implementation.
    pub struct MemoryNode {
        streams: RwLock<HashMap<StreamId, NodeStream>>,
        get_miniblocks_calls: AtomicUsize,
        entered: Notify,
        gate: Mutex<Option<Arc<Semaphore>>>,
        fail_next: Mutex<Option<String>>,
    }

    impl MemoryNode {
        pub fn new() -> Self {
            Self {
                streams: RwLock::new(HashMap::new()),
                get_miniblocks_calls: AtomicUsize::new(0),
                entered: Notify::new(),
                gate: Mutex::new(None),
                fail_next: Mutex::new(None),
            }
        }

        /// Store a stream. `miniblocks` must be numbered from zero.
        pub async fn put_stream(
            &self,
            stream_id: StreamId,
            miniblocks: Vec<Miniblock>,
            minipool: Vec<Envelope>,
        ) -> Result<()> {
            let mut snapshot_num = 0;
            let mut last_hash = None;
            for (i, mb) in miniblocks.iter().enumerate() {
                let parsed = unpack_miniblock(mb, &UnpackOptions::trusted())?;
                if parsed.miniblock_num() != i as u64 {
                    return Err(SyncError::Rpc {
                        method: "put_stream",
                        message: format!(
                            "miniblock at position {} has number {}",
                            i,
                            parsed.miniblock_num()
                        ),
                    });
                }
                if parsed.header.snapshot.is_some() {
                    snapshot_num = parsed.miniblock_num();
                }
                last_hash = Some(parsed.hash);
            }

            self.streams.write().await.insert(
                stream_id,
                NodeStream {
                    miniblocks,
                    minipool,
                    snapshot_num,
                    last_hash,
                },
            );
            Ok(())
        }

        /// Number of `get_miniblocks` calls received so far.
        pub fn get_miniblocks_calls(&self) -> usize {
            self.get_miniblocks_calls.load(Ordering::SeqCst)
        }

        /// Make subsequent `get_miniblocks` calls wait until [`Self::release_requests`].
        pub async fn hold_requests(&self) {
            *self.gate.lock().await = Some(Arc::new(Semaphore::new(0)));
        }

        /// Let held and future `get_miniblocks` calls proceed.
        pub async fn release_requests(&self) {
            if let Some(gate) = self.gate.lock().await.take() {
                gate.close();
            }
        }

        /// Wait until a `get_miniblocks` call has arrived.
        pub async fn wait_for_request(&self) {
            self.entered.notified().await;
        }

        /// Fail the next `get_miniblocks` call with `message`.
        pub async fn fail_next_request(&self, message: impl Into<String>) {
            *self.fail_next.lock().await = Some(message.into());
        }
    }

    impl Default for MemoryNode {
        fn default() -> Self {
            Self::new()
        }
    }

    fn not_found(method: &'static str, stream_id: &StreamId) -> SyncError {
        SyncError::Rpc {
            method,
            message: format!("stream not found: {}", stream_id),
        }
    }

    #[async_trait]
    impl StreamRpc for MemoryNode {
        async fn get_stream(&self, stream_id: &StreamId) -> Result<StreamAndCookie> {
            let streams = self.streams.read().await;
            let stream = streams
                .get(stream_id)
                .ok_or_else(|| not_found("get_stream", stream_id))?;

            let start = stream.snapshot_num as usize;
            Ok(StreamAndCookie {
                miniblocks: stream.miniblocks[start..].to_vec(),
                events: stream.minipool.clone(),
                next_sync_cookie: SyncCookie {
                    stream_id: *stream_id,
                    minipool_gen: stream.miniblocks.len() as u64,
                    prev_miniblock_hash: stream.last_hash,
                },
            })
        }

        async fn get_miniblocks(
            &self,
            stream_id: &StreamId,
            from_inclusive: u64,
            to_exclusive: u64,
        ) -> Result<GetMiniblocksResponse> {
            self.get_miniblocks_calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();

            if let Some(message) = self.fail_next.lock().await.take() {
                return Err(SyncError::Rpc {
                    method: "get_miniblocks",
                    message,
                });
            }

            let gate = self.gate.lock().await.clone();
            if let Some(gate) = gate {
                // Closed once released; the error just means "go ahead".
                let _ = gate.acquire().await;
            }

            if from_inclusive > to_exclusive {
                return Err(SyncError::InvalidRange {
                    stream_id: *stream_id,
                    from_inclusive,
                    to_exclusive,
                });
            }

            let streams = self.streams.read().await;
            let stream = streams
                .get(stream_id)
                .ok_or_else(|| not_found("get_miniblocks", stream_id))?;

            let len = stream.miniblocks.len() as u64;
            let from = from_inclusive.min(len) as usize;
            let to = to_exclusive.min(len) as usize;
            Ok(GetMiniblocksResponse {
                miniblocks: stream.miniblocks[from..to].to_vec(),
                terminus: from_inclusive == 0,
            })
        }
    }
}
