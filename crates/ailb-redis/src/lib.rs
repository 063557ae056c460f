//! ailb Redis - utilization metric store
//!
//! Implements [`ailb_core::MetricStore`] on top of Redis `MGET`:
//! - Connection parameters come from the route's `redis.*` options
//! - The read timeout is enforced here, not in the core
//! - Replies are decoded into the core's array-of-optional-strings shape

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod reply;
pub mod store;

pub use error::{Error, Result};
pub use reply::decode_reply;
pub use store::{connection_url, RedisMetricStore};
