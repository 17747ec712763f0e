//! Backward pagination of stream history.
//!
//! A view holds a contiguous span of miniblocks `[min, max]`. Scrollback
//! fetches the span between the previous snapshot and `min` and prepends it.
//! Requests are coalesced per stream, and a page is only applied if the
//! view's lower bound is still the one the request was issued against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::RwLock;

use river_stream_core::{
    miniblock_span, unpack_miniblock, Miniblock, ParsedMiniblock, StreamId, StreamStateView,
    TimelineEvent, UnpackOptions, ValidationError,
};
use river_stream_store::{MiniblockStore, MiniblockStoreExt};

use crate::error::{Result, SyncError};
use crate::rpc::StreamRpc;

/// Upper bound on scrollback iterations in one `scrollback_to_date` call.
pub const SCROLLBACK_MAX_COUNT: usize = 20;

/// A stream view shared between the session and the scrollback controller.
pub type SharedView = Arc<RwLock<StreamStateView>>;

/// Configuration for scrollback behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollbackConfig {
    /// Maximum `scrollback` calls per `scrollback_to_date`.
    pub max_count: usize,
    /// How fetched miniblocks are verified.
    pub unpack: UnpackOptions,
    /// Read and write the miniblock cache when a store is attached.
    pub use_cache: bool,
}

impl Default for ScrollbackConfig {
    fn default() -> Self {
        Self {
            max_count: SCROLLBACK_MAX_COUNT,
            unpack: UnpackOptions::default(),
            use_cache: true,
        }
    }
}

/// Outcome of one scrollback step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrollback {
    /// The view now reaches the genesis miniblock.
    pub terminus: bool,
    /// Lower bound of the requested span.
    pub from_inclusive_miniblock_num: u64,
    /// Oldest event on the timeline after this step.
    pub first_event: Option<TimelineEvent>,
}

/// Verified miniblocks for a requested span, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiniblockPage {
    pub miniblocks: Vec<ParsedMiniblock>,
    pub terminus: bool,
}

type SharedRequest = Shared<BoxFuture<'static, Result<Scrollback>>>;

struct InFlight {
    id: u64,
    request: SharedRequest,
}

type InFlightTable = Arc<Mutex<HashMap<StreamId, InFlight>>>;

/// Removes a table entry when its request settles, whatever the outcome.
struct InFlightGuard {
    table: InFlightTable,
    stream_id: StreamId,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut table = match self.table.lock() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        if table.get(&self.stream_id).map(|entry| entry.id) == Some(self.id) {
            table.remove(&self.stream_id);
        }
    }
}

/// Extends stream views backward against a node.
///
/// Cloning shares the in-flight table, so clones coalesce with each other.
#[derive(Clone)]
pub struct ScrollbackController {
    rpc: Arc<dyn StreamRpc>,
    store: Option<Arc<dyn MiniblockStore>>,
    config: ScrollbackConfig,
    in_flight: InFlightTable,
    next_id: Arc<AtomicU64>,
}

impl ScrollbackController {
    pub fn new(rpc: Arc<dyn StreamRpc>, config: ScrollbackConfig) -> Self {
        Self {
            rpc,
            store: None,
            config,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a miniblock cache.
    pub fn with_store(mut self, store: Arc<dyn MiniblockStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ScrollbackConfig {
        &self.config
    }

    /// Number of streams with a scrollback in flight.
    pub fn in_flight_count(&self) -> usize {
        match self.in_flight.lock() {
            Ok(table) => table.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Extend `view` back to its previous snapshot.
    ///
    /// Concurrent calls for the same stream share one request and receive
    /// the same result.
    pub async fn scrollback(&self, view: &SharedView) -> Result<Scrollback> {
        let stream_id = view.read().await.stream_id;

        let request = {
            let mut table = self
                .in_flight
                .lock()
                .map_err(|e| SyncError::Internal(format!("scrollback table poisoned: {}", e)))?;

            match table.get(&stream_id) {
                Some(entry) => {
                    tracing::debug!(stream_id = %stream_id, "joining in-flight scrollback");
                    entry.request.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let guard = InFlightGuard {
                        table: Arc::clone(&self.in_flight),
                        stream_id,
                        id,
                    };
                    let this = self.clone();
                    let view = Arc::clone(view);
                    let request = async move {
                        let _guard = guard;
                        this.run(view, stream_id).await
                    }
                    .boxed()
                    .shared();

                    table.insert(
                        stream_id,
                        InFlight {
                            id,
                            request: request.clone(),
                        },
                    );
                    request
                }
            }
        };

        request.await
    }

    async fn run(self, view: SharedView, stream_id: StreamId) -> Result<Scrollback> {
        let (from_inclusive, to_exclusive) = {
            let v = view.read().await;
            let info = v
                .miniblock_info
                .ok_or(SyncError::StreamNotInitialized(stream_id))?;

            if info.terminus_reached {
                tracing::debug!(stream_id = %stream_id, "scrollback: terminus reached");
                return Ok(Scrollback {
                    terminus: true,
                    from_inclusive_miniblock_num: info.min,
                    first_event: v.first_event().cloned(),
                });
            }
            if v.prev_snapshot_miniblock_num > info.min {
                return Err(SyncError::InvalidRange {
                    stream_id,
                    from_inclusive: v.prev_snapshot_miniblock_num,
                    to_exclusive: info.min,
                });
            }
            (v.prev_snapshot_miniblock_num, info.min)
        };

        tracing::debug!(
            stream_id = %stream_id,
            from_inclusive,
            to_exclusive,
            "scrollback"
        );
        let page = self
            .get_miniblocks(&stream_id, from_inclusive, to_exclusive)
            .await?;

        let mut v = view.write().await;
        if v.miniblock_info.map(|info| info.min) != Some(to_exclusive) {
            tracing::info!(
                stream_id = %stream_id,
                to_exclusive,
                "stream view changed during scrollback, discarding page"
            );
            return Ok(Scrollback {
                terminus: false,
                from_inclusive_miniblock_num: from_inclusive,
                first_event: v.first_event().cloned(),
            });
        }

        v.prepend_events(page.miniblocks, page.terminus)?;
        Ok(Scrollback {
            terminus: page.terminus,
            from_inclusive_miniblock_num: from_inclusive,
            first_event: v.first_event().cloned(),
        })
    }

    /// Scroll back until the oldest event predates `to_date_epoch_ms`, the
    /// genesis miniblock is reached, or `max_count` steps have run.
    ///
    /// Returns the last step's outcome, or the current state if no step ran.
    pub async fn scrollback_to_date(
        &self,
        view: &SharedView,
        to_date_epoch_ms: i64,
    ) -> Result<Scrollback> {
        let mut last = None;
        for _ in 0..self.config.max_count {
            let result = self.scrollback(view).await?;
            if result.terminus {
                return Ok(result);
            }
            let reached = result
                .first_event
                .as_ref()
                .is_some_and(|e| e.created_at_epoch_ms < to_date_epoch_ms);
            last = Some(result);
            if reached {
                break;
            }
        }

        match last {
            Some(result) => Ok(result),
            None => {
                let v = view.read().await;
                let info = v
                    .miniblock_info
                    .ok_or(SyncError::StreamNotInitialized(v.stream_id))?;
                Ok(Scrollback {
                    terminus: info.terminus_reached,
                    from_inclusive_miniblock_num: info.min,
                    first_event: v.first_event().cloned(),
                })
            }
        }
    }

    /// Fetch and verify miniblocks `from_inclusive..to_exclusive`.
    ///
    /// Cached blocks directly below `to_exclusive` are used first and only the
    /// remainder is requested. A collapsed range makes no request and is
    /// terminal exactly when it ends at zero.
    pub async fn get_miniblocks(
        &self,
        stream_id: &StreamId,
        from_inclusive: u64,
        to_exclusive: u64,
    ) -> Result<MiniblockPage> {
        if from_inclusive > to_exclusive {
            return Err(SyncError::InvalidRange {
                stream_id: *stream_id,
                from_inclusive,
                to_exclusive,
            });
        }

        let store = self.store.as_ref().filter(|_| self.config.use_cache);
        let mut to_exclusive = to_exclusive;
        let mut cached = Vec::new();
        if let Some(store) = store {
            while to_exclusive > from_inclusive {
                let num = to_exclusive - 1;
                match store
                    .get_parsed_miniblock(stream_id, num, &UnpackOptions::trusted())
                    .await
                {
                    Ok(Some(mb)) => {
                        cached.push(mb);
                        to_exclusive = num;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(
                            stream_id = %stream_id,
                            miniblock_num = num,
                            error = %e,
                            "error reading cached miniblock"
                        );
                        break;
                    }
                }
            }
            cached.reverse();
            if !cached.is_empty() {
                tracing::debug!(
                    stream_id = %stream_id,
                    cached = cached.len(),
                    "miniblock cache hit"
                );
            }
        }

        if from_inclusive == to_exclusive {
            return Ok(MiniblockPage {
                miniblocks: cached,
                terminus: to_exclusive == 0,
            });
        }

        let response = self
            .rpc
            .get_miniblocks(stream_id, from_inclusive, to_exclusive)
            .await?;

        let mut miniblocks = response
            .miniblocks
            .iter()
            .map(|mb| unpack_miniblock(mb, &self.config.unpack))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // The page must end where the cached blocks (or the held span) begin.
        if let Some((from, to)) = miniblock_span(&miniblocks)? {
            if to != to_exclusive {
                return Err(ValidationError::BadBlock(format!(
                    "stream {}: page [{}, {}) does not reach miniblock {}",
                    stream_id, from, to, to_exclusive
                ))
                .into());
            }
        }

        if let Some(store) = store {
            let numbered: Vec<(u64, Miniblock)> = miniblocks
                .iter()
                .map(ParsedMiniblock::miniblock_num)
                .zip(response.miniblocks)
                .collect();
            store.save_miniblocks(stream_id, &numbered).await?;
        }

        miniblocks.extend(cached);
        Ok(MiniblockPage {
            miniblocks,
            terminus: response.terminus,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::memory::MemoryNode;
    use river_stream_core::unpack_stream;
    use river_stream_store::MemoryStore;
    use river_stream_testkit::fixtures::{test_stream_id, StreamBuilder};

    struct Setup {
        node: Arc<MemoryNode>,
        builder: StreamBuilder,
        view: SharedView,
    }

    /// A node with `blocks` miniblocks and a view initialized from it.
    async fn setup(blocks: usize, snapshot_interval: u64) -> Setup {
        let mut builder = StreamBuilder::new(test_stream_id()).snapshot_interval(snapshot_interval);
        builder.add_blocks(blocks, 2);

        let node = Arc::new(MemoryNode::new());
        node.put_stream(
            builder.stream_id(),
            builder.miniblocks().to_vec(),
            builder.minipool().to_vec(),
        )
        .await
        .unwrap();

        let response = node.get_stream(&builder.stream_id()).await.unwrap();
        let mut view = StreamStateView::new(builder.stream_id());
        view.initialize(unpack_stream(&response, &UnpackOptions::default()).unwrap())
            .unwrap();

        Setup {
            node,
            builder,
            view: Arc::new(RwLock::new(view)),
        }
    }

    fn controller(node: &Arc<MemoryNode>) -> ScrollbackController {
        ScrollbackController::new(node.clone(), ScrollbackConfig::default())
    }

    #[tokio::test]
    async fn test_scrollback_prepends_previous_span() {
        let s = setup(25, 10).await;
        let ctl = controller(&s.node);

        let result = ctl.scrollback(&s.view).await.unwrap();
        assert!(!result.terminus);
        assert_eq!(result.from_inclusive_miniblock_num, 10);

        let view = s.view.read().await;
        let info = view.miniblock_info.unwrap();
        assert_eq!(info.min, 10);
        assert_eq!(view.prev_snapshot_miniblock_num, 0);
        assert_eq!(view.timeline.len(), 15 * 2);
        assert_eq!(result.first_event.as_ref(), view.first_event());
    }

    #[tokio::test]
    async fn test_scrollback_reaches_terminus() {
        let s = setup(25, 10).await;
        let ctl = controller(&s.node);

        ctl.scrollback(&s.view).await.unwrap();
        let result = ctl.scrollback(&s.view).await.unwrap();
        assert!(result.terminus);
        assert_eq!(s.view.read().await.timeline.len(), 25 * 2);

        // Nothing left to fetch.
        let calls = s.node.get_miniblocks_calls();
        let again = ctl.scrollback(&s.view).await.unwrap();
        assert!(again.terminus);
        assert_eq!(s.node.get_miniblocks_calls(), calls);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_request() {
        let s = setup(25, 10).await;
        let ctl = controller(&s.node);
        s.node.hold_requests().await;

        let (a, b, ()) = tokio::join!(ctl.scrollback(&s.view), ctl.scrollback(&s.view), async {
            s.node.wait_for_request().await;
            assert_eq!(ctl.in_flight_count(), 1);
            s.node.release_requests().await;
        });

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(s.node.get_miniblocks_calls(), 1);
        assert_eq!(ctl.in_flight_count(), 0);
        assert_eq!(s.view.read().await.miniblock_info.unwrap().min, 10);
    }

    #[tokio::test]
    async fn test_streams_do_not_coalesce_across_ids() {
        let s = setup(25, 10).await;
        let ctl = controller(&s.node);

        let mut other = StreamBuilder::new(river_stream_core::StreamId::from_bytes([0x20; 32]));
        other.add_blocks(15, 1);
        s.node
            .put_stream(other.stream_id(), other.miniblocks().to_vec(), vec![])
            .await
            .unwrap();
        let response = s.node.get_stream(&other.stream_id()).await.unwrap();
        let mut view = StreamStateView::new(other.stream_id());
        view.initialize(unpack_stream(&response, &UnpackOptions::default()).unwrap())
            .unwrap();
        let other_view = Arc::new(RwLock::new(view));

        let (a, b) = tokio::join!(ctl.scrollback(&s.view), ctl.scrollback(&other_view));
        assert!(!a.unwrap().terminus);
        assert!(b.unwrap().terminus);
        assert_eq!(s.node.get_miniblocks_calls(), 2);
    }

    #[tokio::test]
    async fn test_error_propagates_and_clears_entry() {
        let s = setup(25, 10).await;
        let ctl = controller(&s.node);
        s.node.fail_next_request("node unavailable").await;

        let err = ctl.scrollback(&s.view).await.unwrap_err();
        assert!(matches!(err, SyncError::Rpc { .. }));
        assert_eq!(ctl.in_flight_count(), 0);

        // The view is untouched and a retry goes through.
        assert_eq!(s.view.read().await.miniblock_info.unwrap().min, 20);
        let result = ctl.scrollback(&s.view).await.unwrap();
        assert_eq!(result.from_inclusive_miniblock_num, 10);
        assert_eq!(s.node.get_miniblocks_calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_page_is_discarded() {
        let mut s = setup(25, 10).await;
        let ctl = controller(&s.node);
        s.node.hold_requests().await;

        let task = {
            let (ctl, view) = (ctl.clone(), s.view.clone());
            tokio::spawn(async move { ctl.scrollback(&view).await })
        };
        s.node.wait_for_request().await;

        // The stream grows past a new snapshot and the view is reinitialized.
        s.builder.add_blocks(6, 1);
        let response = unpack_stream(&s.builder.stream_response(), &UnpackOptions::default()).unwrap();
        s.view.write().await.initialize(response).unwrap();
        let before = s.view.read().await.timeline.clone();

        s.node.release_requests().await;
        let result = task.await.unwrap().unwrap();

        assert!(!result.terminus);
        let view = s.view.read().await;
        assert_eq!(view.miniblock_info.unwrap().min, 30);
        assert_eq!(view.timeline, before);
    }

    #[tokio::test]
    async fn test_scrollback_to_date_stops_at_terminus() {
        let s = setup(25, 10).await;
        let ctl = controller(&s.node);

        let result = ctl.scrollback_to_date(&s.view, 0).await.unwrap();
        assert!(result.terminus);
        assert_eq!(s.node.get_miniblocks_calls(), 2);
    }

    #[tokio::test]
    async fn test_scrollback_to_date_stops_when_old_enough() {
        let s = setup(25, 5).await;
        let ctl = controller(&s.node);

        // Events of block n are numbered 2n and 2n+1.
        let target = StreamBuilder::event_time(2 * 14);
        let result = ctl.scrollback_to_date(&s.view, target).await.unwrap();

        assert!(!result.terminus);
        assert_eq!(s.node.get_miniblocks_calls(), 2);
        assert_eq!(s.view.read().await.miniblock_info.unwrap().min, 10);
        assert!(result.first_event.unwrap().created_at_epoch_ms < target);
    }

    #[tokio::test]
    async fn test_scrollback_to_date_respects_max_count() {
        let s = setup(25, 5).await;
        let config = ScrollbackConfig {
            max_count: 1,
            ..ScrollbackConfig::default()
        };
        let ctl = ScrollbackController::new(s.node.clone(), config);

        let result = ctl.scrollback_to_date(&s.view, 0).await.unwrap();
        assert!(!result.terminus);
        assert_eq!(s.node.get_miniblocks_calls(), 1);
    }

    #[tokio::test]
    async fn test_degenerate_range_makes_no_request() {
        let s = setup(3, 10).await;
        let ctl = controller(&s.node);
        let stream_id = s.builder.stream_id();

        let page = ctl.get_miniblocks(&stream_id, 0, 0).await.unwrap();
        assert!(page.terminus);
        assert!(page.miniblocks.is_empty());

        let page = ctl.get_miniblocks(&stream_id, 7, 7).await.unwrap();
        assert!(!page.terminus);
        assert_eq!(s.node.get_miniblocks_calls(), 0);

        let err = ctl.get_miniblocks(&stream_id, 8, 7).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRange { .. }));
    }

    #[tokio::test]
    async fn test_uninitialized_view() {
        let s = setup(3, 10).await;
        let ctl = controller(&s.node);
        let view = Arc::new(RwLock::new(StreamStateView::new(s.builder.stream_id())));

        let err = ctl.scrollback(&view).await.unwrap_err();
        assert!(matches!(err, SyncError::StreamNotInitialized(_)));
    }

    #[tokio::test]
    async fn test_cache_serves_second_view() {
        let s = setup(25, 10).await;
        let stream_id = s.builder.stream_id();
        let store: Arc<dyn MiniblockStore> = Arc::new(MemoryStore::new());
        let ctl = controller(&s.node).with_store(store.clone());

        ctl.scrollback(&s.view).await.unwrap();
        assert_eq!(s.node.get_miniblocks_calls(), 1);
        assert_eq!(
            store.miniblock_bounds(&stream_id).await.unwrap(),
            Some((10, 19))
        );

        // A fresh view of the same stream scrolls back from the cache alone.
        let response = s.node.get_stream(&stream_id).await.unwrap();
        let mut fresh = StreamStateView::new(stream_id);
        fresh
            .initialize(unpack_stream(&response, &UnpackOptions::default()).unwrap())
            .unwrap();
        let fresh = Arc::new(RwLock::new(fresh));

        let result = ctl.scrollback(&fresh).await.unwrap();
        assert_eq!(s.node.get_miniblocks_calls(), 1);
        assert_eq!(result.from_inclusive_miniblock_num, 10);
        assert!(!result.terminus);

        let fresh = fresh.read().await;
        assert_eq!(fresh.miniblock_info.unwrap().min, 10);
        assert_eq!(fresh.timeline, s.view.read().await.timeline);
    }

    #[tokio::test]
    async fn test_partial_cache_shrinks_request() {
        let s = setup(25, 10).await;
        let stream_id = s.builder.stream_id();
        let store = Arc::new(MemoryStore::new());
        let cached: Vec<_> = (15..20u64)
            .map(|n| (n, s.builder.miniblocks()[n as usize].clone()))
            .collect();
        store.save_miniblocks(&stream_id, &cached).await.unwrap();

        let ctl = controller(&s.node).with_store(store.clone());
        let page = ctl.get_miniblocks(&stream_id, 10, 20).await.unwrap();

        let nums: Vec<u64> = page.miniblocks.iter().map(|mb| mb.miniblock_num()).collect();
        assert_eq!(nums, (10..20).collect::<Vec<_>>());
        assert_eq!(s.node.get_miniblocks_calls(), 1);
        assert_eq!(
            store.miniblock_bounds(&stream_id).await.unwrap(),
            Some((10, 19))
        );
    }

    /// Serves pages from `inner` with the newest block missing.
    struct ShortPageNode {
        inner: Arc<MemoryNode>,
    }

    #[async_trait::async_trait]
    impl StreamRpc for ShortPageNode {
        async fn get_stream(&self, stream_id: &StreamId) -> Result<river_stream_core::StreamAndCookie> {
            self.inner.get_stream(stream_id).await
        }

        async fn get_miniblocks(
            &self,
            stream_id: &StreamId,
            from_inclusive: u64,
            to_exclusive: u64,
        ) -> Result<crate::rpc::GetMiniblocksResponse> {
            let mut response = self
                .inner
                .get_miniblocks(stream_id, from_inclusive, to_exclusive)
                .await?;
            response.miniblocks.pop();
            Ok(response)
        }
    }

    #[tokio::test]
    async fn test_short_page_is_rejected() {
        let s = setup(25, 10).await;
        let store = Arc::new(MemoryStore::new());
        let rpc = Arc::new(ShortPageNode {
            inner: s.node.clone(),
        });
        let ctl = ScrollbackController::new(rpc, ScrollbackConfig::default()).with_store(store.clone());

        let err = ctl.scrollback(&s.view).await.unwrap_err();
        match err {
            SyncError::Validation(e) => assert_eq!(e.code(), river_stream_core::ErrorCode::BadBlock),
            other => panic!("unexpected error: {:?}", other),
        }

        let view = s.view.read().await;
        let info = view.miniblock_info.unwrap();
        assert_eq!(info.min, 20);
        assert!(!info.terminus_reached);
        assert_eq!(view.timeline.len(), 5 * 2);
        assert_eq!(
            store.miniblock_bounds(&s.builder.stream_id()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_cache_disabled_by_config() {
        let s = setup(25, 10).await;
        let store = Arc::new(MemoryStore::new());
        let config = ScrollbackConfig {
            use_cache: false,
            ..ScrollbackConfig::default()
        };
        let ctl = ScrollbackController::new(s.node.clone(), config).with_store(store.clone());

        ctl.scrollback(&s.view).await.unwrap();
        assert_eq!(
            store.miniblock_bounds(&s.builder.stream_id()).await.unwrap(),
            None
        );
    }
}
