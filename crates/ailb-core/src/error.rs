//! Error types for ailb-core
//!
//! None of these ever reach the client. Every variant has a local recovery
//! (pass-through, random fallback, skipped metric, untouched body); the enum
//! exists so those recoveries can be logged and tested.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Route configuration rejected at load time
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metric store call failed or could not be started
    #[error("store transport error: {0}")]
    StoreTransport(String),

    /// A single metric entry that is not an integer
    #[error("malformed metric for key {key}: {value:?}")]
    MalformedMetric {
        /// Full store key (prefix included)
        key: String,
        /// Raw value returned by the store
        value: String,
    },

    /// Request body could not take the field rewrite
    #[error("body rewrite error: {0}")]
    BodyRewrite(String),

    /// Pause/resume state machine misuse
    #[error("suspension error: {0}")]
    Suspension(#[from] SuspensionError),
}

impl From<crate::store::StoreError> for Error {
    fn from(err: crate::store::StoreError) -> Self {
        Error::StoreTransport(err.to_string())
    }
}

/// Configuration errors raised while resolving a [`RawConfig`](crate::config::RawConfig)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required option is absent or empty
    #[error("missing required option: {0}")]
    MissingField(&'static str),

    /// Provider entry without a name
    #[error("provider #{index} has an empty name")]
    EmptyProviderName {
        /// Position in the `providers` list
        index: usize,
    },

    /// Two providers share a name
    #[error("duplicate provider name: {0}")]
    DuplicateProvider(String),

    /// Payload does not match the configuration schema
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the request suspension state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SuspensionError {
    /// The request is already waiting on metrics
    #[error("request is already paused")]
    AlreadyPaused,

    /// The request has already been resumed
    #[error("request was already resumed")]
    AlreadyResumed,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
