//! Error types for the client.

use river_stream_core::{StreamId, ValidationError};
use river_stream_store::StoreError;
use river_stream_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An event or stream failed verification, or could not be built.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Miniblock cache error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Node access or scrollback error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The stream has no local view.
    #[error("stream not found: {0}")]
    StreamNotFound(StreamId),
}

impl ClientError {
    /// The protocol error code, for verification failures.
    pub fn code(&self) -> Option<river_stream_core::ErrorCode> {
        match self {
            ClientError::Validation(e) | ClientError::Sync(SyncError::Validation(e)) => {
                Some(e.code())
            }
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
