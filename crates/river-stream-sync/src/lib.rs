//! # River Stream Sync
//!
//! Node access and history pagination for River stream clients.
//!
//! ## Overview
//!
//! [`StreamRpc`] is the read surface of a River node. The
//! [`ScrollbackController`] uses it to extend a [`SharedView`] backward one
//! snapshot span at a time, optionally through a miniblock cache.
//!
//! ## Key Properties
//!
//! - **Single-flight**: Concurrent scrollbacks of one stream share one request
//! - **Race-safe**: A page is applied only if the view's lower bound is unchanged
//! - **No retries**: Node errors surface to the caller; a later call starts fresh
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use river_stream_sync::{memory::MemoryNode, ScrollbackConfig, ScrollbackController, SharedView};
//!
//! async fn example(view: SharedView) {
//!     let node = Arc::new(MemoryNode::new());
//!     let scrollback = ScrollbackController::new(node, ScrollbackConfig::default());
//!
//!     let result = scrollback.scrollback(&view).await.unwrap();
//!     println!("terminus: {}", result.terminus);
//! }
//! ```

pub mod error;
pub mod rpc;
pub mod scrollback;

pub use error::{Result, SyncError};
pub use rpc::{memory, GetMiniblocksResponse, StreamRpc};
pub use scrollback::{
    MiniblockPage, Scrollback, ScrollbackConfig, ScrollbackController, SharedView,
    SCROLLBACK_MAX_COUNT,
};
