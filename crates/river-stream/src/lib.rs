//! # River Stream
//!
//! The client layer of the River stream protocol: signing identities,
//! verified event envelopes, stream state and history scrollback.
//!
//! ## Overview
//!
//! - **Signing**: Events are signed by a device key, optionally delegated by a primary wallet
//! - **Envelopes**: Every event travels as hash + signature + canonical bytes
//! - **Miniblocks**: Streams arrive as verified blocks, header event last
//! - **Scrollback**: Older history is fetched one snapshot span at a time
//!
//! ## Key Concepts
//!
//! - **Stream view**: The contiguous span of miniblocks held locally.
//! - **Terminus**: The view reaches the stream's genesis miniblock.
//! - **Single-flight**: Concurrent scrollbacks of one stream share one request.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use river_stream::{Client, ClientConfig};
//! use river_stream::core::{make_undelegated_context, Payload, StreamId, Wallet};
//! use river_stream::sync::memory::MemoryNode;
//!
//! async fn example(stream_id: StreamId) {
//!     // Sign directly with a fresh wallet
//!     let context = make_undelegated_context(Arc::new(Wallet::generate())).unwrap();
//!
//!     // Connect to a node
//!     let node = Arc::new(MemoryNode::new());
//!     let client = Client::new(context, node, ClientConfig::default());
//!
//!     // Load the stream from its latest snapshot
//!     client.init_stream(&stream_id).await.unwrap();
//!
//!     // Sign a message against the latest miniblock
//!     let _envelope = client
//!         .make_event_for_stream(&stream_id, Payload::channel_message("hello"))
//!         .await
//!         .unwrap();
//!
//!     // Load older history
//!     let result = client.scrollback(&stream_id).await.unwrap();
//!     println!("reached genesis: {}", result.terminus);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `river_stream::core` - Signing, envelopes, miniblocks and stream views
//! - `river_stream::store` - Miniblock cache abstraction and SQLite
//! - `river_stream::sync` - Node RPC and scrollback

pub mod client;
pub mod error;

// Re-export component crates
pub use river_stream_core as core;
pub use river_stream_store as store;
pub use river_stream_sync as sync;

// Re-export main types for convenience
pub use client::{Client, ClientConfig};
pub use error::{ClientError, Result};

// Re-export commonly used types
pub use river_stream_core::{
    Envelope, ErrorCode, ParsedEvent, ParsedMiniblock, Payload, SignerContext, StreamId,
    StreamStateView, UnpackOptions, ValidationError,
};
pub use river_stream_sync::{Scrollback, ScrollbackConfig, SharedView, StreamRpc};
