//! Error types for River stream primitives.

use std::fmt;

use thiserror::Error;

/// Low-level failures from encoding, decoding and the crypto primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Protocol error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadPayload,
    BadHashFormat,
    BadPublicKey,
    BadEvent,
    BadEventId,
    BadEventSignature,
    BadDelegateSig,
    BadBlock,
}

impl ErrorCode {
    /// The wire name of this code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadPayload => "BAD_PAYLOAD",
            ErrorCode::BadHashFormat => "BAD_HASH_FORMAT",
            ErrorCode::BadPublicKey => "BAD_PUBLIC_KEY",
            ErrorCode::BadEvent => "BAD_EVENT",
            ErrorCode::BadEventId => "BAD_EVENT_ID",
            ErrorCode::BadEventSignature => "BAD_EVENT_SIGNATURE",
            ErrorCode::BadDelegateSig => "BAD_DELEGATE_SIG",
            ErrorCode::BadBlock => "BAD_BLOCK",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors raised while building or verifying stream data.
///
/// Every variant is fatal to the operation that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("BAD_PAYLOAD: {0}")]
    BadPayload(String),

    #[error("BAD_HASH_FORMAT: {0}")]
    BadHashFormat(String),

    #[error("BAD_PUBLIC_KEY: {0}")]
    BadPublicKey(String),

    #[error("BAD_EVENT: {0}")]
    BadEvent(String),

    #[error("BAD_EVENT_ID: {0}")]
    BadEventId(String),

    #[error("BAD_EVENT_SIGNATURE: {0}")]
    BadEventSignature(String),

    #[error("BAD_DELEGATE_SIG: {0}")]
    BadDelegateSig(String),

    #[error("BAD_BLOCK: {0}")]
    BadBlock(String),
}

impl ValidationError {
    /// The protocol code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::BadPayload(_) => ErrorCode::BadPayload,
            ValidationError::BadHashFormat(_) => ErrorCode::BadHashFormat,
            ValidationError::BadPublicKey(_) => ErrorCode::BadPublicKey,
            ValidationError::BadEvent(_) => ErrorCode::BadEvent,
            ValidationError::BadEventId(_) => ErrorCode::BadEventId,
            ValidationError::BadEventSignature(_) => ErrorCode::BadEventSignature,
            ValidationError::BadDelegateSig(_) => ErrorCode::BadDelegateSig,
            ValidationError::BadBlock(_) => ErrorCode::BadBlock,
        }
    }
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature(msg) | CoreError::SigningFailed(msg) => {
                ValidationError::BadEventSignature(msg)
            }
            CoreError::InvalidPublicKey(msg) => ValidationError::BadPublicKey(msg),
            CoreError::EncodingError(msg) | CoreError::DecodingError(msg) => {
                ValidationError::BadEvent(msg)
            }
        }
    }
}

/// Result alias for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;
