//! Utilization metric readings
//!
//! Turns a raw batched-read response into per-provider readings the
//! Selection Engine can scan. Missing and malformed entries are kept
//! distinct here for logging but are treated the same by selection.

use crate::error::{Error, Result};
use crate::store::{StoreReply, StoreResponse};
use tracing::{debug, warn};

/// One provider's utilization reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricReading {
    /// Integer utilization (0-100 by convention, not enforced)
    Present(i64),
    /// Store returned null / no entry
    Missing,
    /// Store returned something that is not an integer
    Malformed,
}

impl MetricReading {
    /// The usable value, if any
    #[must_use]
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Present(v) => Some(*v),
            Self::Missing | Self::Malformed => None,
        }
    }
}

/// Parse one raw metric value
///
/// # Errors
///
/// Returns [`Error::MalformedMetric`] for anything that is not a plain integer.
pub fn parse_metric(key: &str, raw: &str) -> Result<i64> {
    raw.parse::<i64>().map_err(|_| Error::MalformedMetric {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

/// The batched read as seen by the Selection Engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSnapshot {
    /// Readings aligned positionally with the key list
    Readings(Vec<MetricReading>),
    /// Transport error or non-array reply: no readings at all
    Unavailable,
}

impl MetricSnapshot {
    /// Interpret a store response against the keys that were sent
    ///
    /// Entries beyond `keys.len()` are ignored; the result never reorders.
    #[must_use]
    pub fn from_response(keys: &[String], response: StoreResponse) -> Self {
        match response {
            Ok(StoreReply::Array(values)) => Self::Readings(
                keys.iter()
                    .zip(values)
                    .map(|(key, raw)| read_entry(key, raw.as_deref()))
                    .collect(),
            ),
            Ok(StoreReply::NonArray) => {
                warn!("Metric store returned a non-array reply");
                Self::Unavailable
            }
            Err(e) => {
                warn!(error = %e, "Metric store read failed");
                Self::Unavailable
            }
        }
    }
}

fn read_entry(key: &str, raw: Option<&str>) -> MetricReading {
    let Some(raw) = raw else {
        debug!(key = %key, "Metric missing");
        return MetricReading::Missing;
    };
    match parse_metric(key, raw) {
        Ok(v) => MetricReading::Present(v),
        Err(e) => {
            warn!(error = %e, "Skipping malformed metric");
            MetricReading::Malformed
        }
    }
}
