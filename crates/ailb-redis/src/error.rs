//! Error types for ailb-redis

use ailb_core::StoreError;
use thiserror::Error;

/// Redis store error type
#[derive(Debug, Error)]
pub enum Error {
    /// Connection parameters do not form a valid address
    #[error("invalid redis address: {0}")]
    InvalidAddress(String),

    /// Could not connect
    #[error("redis connection failed: {0}")]
    Connection(String),

    /// Command failed in flight
    #[error("redis command failed: {0}")]
    Command(String),

    /// No answer within the configured timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Called outside a Tokio runtime
    #[error("no async runtime available")]
    NoRuntime,
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::NoRuntime | Error::InvalidAddress(_) => StoreError::Unavailable(err.to_string()),
            Error::Timeout(ms) => StoreError::Timeout(ms),
            Error::Connection(_) | Error::Command(_) => StoreError::Transport(err.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
