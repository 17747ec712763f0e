//! # River Stream Testkit
//!
//! Testing utilities for River stream clients.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Deterministic wallets, signer contexts and a node-side
//!   miniblock chain builder
//! - **Generators**: Proptest strategies for property-based testing
//! - **Golden vectors**: Known answers for hashing, addresses and event construction
//!
//! ## Test Fixtures
//!
//! ```rust
//! use river_stream_testkit::fixtures::{test_stream_id, StreamBuilder};
//!
//! let mut builder = StreamBuilder::new(test_stream_id()).snapshot_interval(5);
//! builder.add_blocks(12, 3);
//! let response = builder.stream_response();
//! assert_eq!(response.miniblocks.len(), 2);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use river_stream_testkit::generators::{envelope_from_params, EventParams};
//!
//! proptest! {
//!     #[test]
//!     fn event_hash_is_deterministic(params: EventParams) {
//!         let a = envelope_from_params(&params);
//!         let b = envelope_from_params(&params);
//!         prop_assert_eq!(a.hash, b.hash);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    context, delegated_context, node_context, test_stream_id, user_context, wallet,
    MiniblockFactory, StreamBuilder,
};
pub use generators::{envelope_from_params, EventParams};
pub use vectors::{verify_all_vectors, SCENARIO_MINIBLOCK_HASH};
