//! # River Stream Store
//!
//! Local miniblock cache for River stream clients. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! Sealed miniblocks never change, so a client can keep the ones it has seen
//! and skip the network on later scrollbacks. Blocks are stored in wire form
//! and verified again when read.
//!
//! ## Key Types
//!
//! - [`MiniblockStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage
//! - [`InsertResult`] - Result of saving a miniblock
//!
//! ## Usage
//!
//! ```rust,no_run
//! use river_stream_store::{MiniblockStore, SqliteStore};
//! use river_stream_core::StreamId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("miniblocks.db").unwrap();
//!
//!     let stream_id = StreamId::from_bytes([0x20; 32]);
//!     let cached = store.get_miniblocks_range(&stream_id, 0, 10).await.unwrap();
//!     println!("{} cached blocks", cached.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent saves**: Saving the same miniblock twice returns `AlreadyExists`
//! - **Conflict detection**: A different header hash at the same number returns `Conflict`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{miniblock_hash, InsertResult, MiniblockStore, MiniblockStoreExt};
