//! Metric store contract
//!
//! The key-value store holding utilization metrics is an external
//! collaborator. The core only needs one operation from it: a batched
//! multi-key read that reports back through a completion callback.

use thiserror::Error;

/// Store-level failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The call could not be started (no connection, no runtime)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call was started but failed in flight
    #[error("store transport error: {0}")]
    Transport(String),

    /// The store did not answer in time
    #[error("store timeout after {0}ms")]
    Timeout(u64),
}

/// Shape of a successful batched read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreReply {
    /// One entry per requested key, in request order. `None` is a missing key.
    Array(Vec<Option<String>>),
    /// The store answered with something other than an array
    NonArray,
}

/// What the completion callback receives
pub type StoreResponse = Result<StoreReply, StoreError>;

/// Completion callback for a batched read; invoked at most once
pub type ReplyCallback = Box<dyn FnOnce(StoreResponse) + Send + 'static>;

/// Batched-read access to the utilization metric store
#[cfg_attr(test, mockall::automock)]
pub trait MetricStore: Send + Sync {
    /// Issue one batched read for `keys`
    ///
    /// On `Ok(())` the store must invoke `on_reply` exactly once, including
    /// when the connection is torn down mid-flight (as an error response).
    ///
    /// # Errors
    ///
    /// Returns an error when the call cannot be initiated. `on_reply` is then
    /// never invoked.
    fn batch_get(
        &self,
        keys: Vec<String>,
        on_reply: ReplyCallback,
    ) -> std::result::Result<(), StoreError>;
}
