//! Error types for the sync module.

use thiserror::Error;

use river_stream_core::{StreamId, ValidationError};
use river_stream_store::StoreError;

/// Errors that can occur while talking to a node or applying its responses.
///
/// `Clone` so one settled scrollback result can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The node call failed.
    #[error("rpc error ({method}): {message}")]
    Rpc {
        method: &'static str,
        message: String,
    },

    /// A response failed verification.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Miniblock cache operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// The stream view has not been initialized from a node response.
    #[error("stream not initialized: {0}")]
    StreamNotInitialized(StreamId),

    /// A miniblock range with `from_inclusive > to_exclusive`.
    #[error("invalid miniblock range for {stream_id}: [{from_inclusive}, {to_exclusive})")]
    InvalidRange {
        stream_id: StreamId,
        from_inclusive: u64,
        to_exclusive: u64,
    },

    /// Internal bookkeeping failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
