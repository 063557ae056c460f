//! ailb Core - metric-driven provider selection
//!
//! This crate provides the per-request decision path of the ailb gateway
//! filter:
//! - Config: typed route configuration, resolved once at load time
//! - Fetcher: ordered metric keys and the single batched store read
//! - Selection: lowest-utilization choice with random fallback
//! - Steering: routing header, model carrier and body field rewrite
//! - Suspension: pause/resume state machine with a one-shot resume token
//! - Filter: header and body phases wired together per route
//!
//! The host gateway and the metric store are external; the core talks to
//! them through [`HostRequest`] and [`MetricStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod host;
pub mod metric;
pub mod selection;
pub mod steering;
pub mod store;
pub mod suspension;

pub use config::{
    ProviderSpec, RawConfig, RawProvider, RawRedisConfig, RewriteConfig, RoutingConfig,
    StoreParams,
};
pub use error::{ConfigError, Error, Result, SuspensionError};
pub use fetcher::{metric_keys, MetricFetcher};
pub use filter::{LoadBalancer, RequestContext, RngSource};
pub use host::{FilterAction, HostRequest, MemoryRequest};
pub use metric::{MetricReading, MetricSnapshot};
pub use selection::{select, SelectionOutcome, SelectionReason};
pub use store::{MetricStore, ReplyCallback, StoreError, StoreReply, StoreResponse};
pub use suspension::{ResumeEvent, ResumeToken, Suspension, SuspensionState};
