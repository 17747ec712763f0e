//! The Client: one user's session against a River node.
//!
//! The client owns the signing identity, the node connection, the local
//! stream views and the scrollback controller for those views.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use river_stream_core::{
    make_event, unpack_envelopes, unpack_stream, Envelope, Payload, SignerContext,
    StreamStateView, StreamId, SyncCookie, UnpackOptions,
};
use river_stream_store::MiniblockStore;
use river_stream_sync::{
    Scrollback, ScrollbackConfig, ScrollbackController, SharedView, StreamRpc,
};

use crate::error::{ClientError, Result};

/// Configuration for the Client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Scrollback configuration.
    pub scrollback: ScrollbackConfig,
    /// How stream responses and sync updates are verified.
    pub unpack: UnpackOptions,
}

/// A River stream client.
pub struct Client {
    context: SignerContext,
    rpc: Arc<dyn StreamRpc>,
    config: ClientConfig,
    streams: RwLock<HashMap<StreamId, SharedView>>,
    scrollback: ScrollbackController,
}

impl Client {
    /// Create a client signing with `context`.
    pub fn new(context: SignerContext, rpc: Arc<dyn StreamRpc>, config: ClientConfig) -> Self {
        let scrollback = ScrollbackController::new(Arc::clone(&rpc), config.scrollback);
        Self {
            context,
            rpc,
            config,
            streams: RwLock::new(HashMap::new()),
            scrollback,
        }
    }

    /// Cache miniblocks fetched during scrollback in `store`.
    pub fn with_store(mut self, store: Arc<dyn MiniblockStore>) -> Self {
        self.scrollback = ScrollbackController::new(Arc::clone(&self.rpc), self.config.scrollback)
            .with_store(store);
        self
    }

    pub fn context(&self) -> &SignerContext {
        &self.context
    }

    /// The user id events from this client are attributed to.
    pub fn user_id(&self) -> String {
        self.context.user_id()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Build and sign an event.
    pub fn make_event(
        &self,
        payload: Payload,
        prev_miniblock_hash: Option<&[u8]>,
    ) -> Result<Envelope> {
        Ok(make_event(&self.context, payload, prev_miniblock_hash)?)
    }

    /// Build and sign an event against the latest miniblock of a local stream.
    pub async fn make_event_for_stream(
        &self,
        stream_id: &StreamId,
        payload: Payload,
    ) -> Result<Envelope> {
        let view = self.require_stream(stream_id).await?;
        let prev = view.read().await.prev_miniblock_hash;
        self.make_event(payload, prev.as_ref().map(|h| h.as_bytes().as_slice()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stream Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch and verify a stream into a detached view.
    pub async fn get_stream(&self, stream_id: &StreamId) -> Result<StreamStateView> {
        let response = self.rpc.get_stream(stream_id).await?;
        let parsed = unpack_stream(&response, &self.config.unpack)?;

        let mut view = StreamStateView::new(*stream_id);
        view.initialize(parsed)?;
        Ok(view)
    }

    /// Fetch a stream and (re)initialize its local view.
    ///
    /// An existing view is reset in place, so holders of it see the new span.
    pub async fn init_stream(&self, stream_id: &StreamId) -> Result<SharedView> {
        let response = self.rpc.get_stream(stream_id).await?;
        let parsed = unpack_stream(&response, &self.config.unpack)?;

        let view = {
            let mut streams = self.streams.write().await;
            Arc::clone(
                streams
                    .entry(*stream_id)
                    .or_insert_with(|| Arc::new(RwLock::new(StreamStateView::new(*stream_id)))),
            )
        };
        view.write().await.initialize(parsed)?;

        tracing::info!(stream_id = %stream_id, "stream initialized");
        Ok(view)
    }

    /// The local view of a stream, if any.
    pub async fn stream(&self, stream_id: &StreamId) -> Option<SharedView> {
        self.streams.read().await.get(stream_id).cloned()
    }

    /// Drop the local view of a stream.
    pub async fn remove_stream(&self, stream_id: &StreamId) -> Option<SharedView> {
        self.streams.write().await.remove(stream_id)
    }

    /// Apply a sync update to a local stream. Returns the number of new events.
    pub async fn apply_sync_update(
        &self,
        stream_id: &StreamId,
        events: &[Envelope],
        next_sync_cookie: SyncCookie,
    ) -> Result<usize> {
        let view = self.require_stream(stream_id).await?;
        let parsed = unpack_envelopes(events, &self.config.unpack)?;
        let appended = view.write().await.append_events(parsed, next_sync_cookie)?;
        Ok(appended)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scrollback
    // ─────────────────────────────────────────────────────────────────────────

    /// Extend a local stream back by one snapshot span.
    pub async fn scrollback(&self, stream_id: &StreamId) -> Result<Scrollback> {
        let view = self.require_stream(stream_id).await?;
        Ok(self.scrollback.scrollback(&view).await?)
    }

    /// Extend a local stream back until its oldest event predates `to_date_epoch_ms`.
    pub async fn scrollback_to_date(
        &self,
        stream_id: &StreamId,
        to_date_epoch_ms: i64,
    ) -> Result<Scrollback> {
        let view = self.require_stream(stream_id).await?;
        Ok(self
            .scrollback
            .scrollback_to_date(&view, to_date_epoch_ms)
            .await?)
    }

    async fn require_stream(&self, stream_id: &StreamId) -> Result<SharedView> {
        self.stream(stream_id)
            .await
            .ok_or(ClientError::StreamNotFound(*stream_id))
    }
}
