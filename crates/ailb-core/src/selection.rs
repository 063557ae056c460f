//! Selection Engine
//!
//! Picks exactly one provider per request from a metric snapshot:
//!
//! 1. No providers: `NoProviders` (pass-through).
//! 2. Snapshot unavailable (transport error, non-array reply): uniform random.
//! 3. Otherwise the lowest usable reading wins; ties go to the lowest index.
//! 4. No usable reading at all: uniform random.
//!
//! Values are compared as plain integers with no range check, weighting or
//! smoothing.

use crate::config::ProviderSpec;
use crate::metric::{MetricReading, MetricSnapshot};
use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Why a provider was (or was not) chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionReason {
    /// Lowest utilization among usable readings
    LowestMetric,
    /// No usable readings; uniform random pick
    RandomFallback,
    /// Route has no providers; request passes through
    NoProviders,
}

impl SelectionReason {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowestMetric => "lowest-metric",
            Self::RandomFallback => "random-fallback",
            Self::NoProviders => "no-providers",
        }
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionOutcome {
    /// Chosen provider; `None` only for [`SelectionReason::NoProviders`]
    pub chosen: Option<ProviderSpec>,
    /// How the choice was made
    pub reason: SelectionReason,
}

impl SelectionOutcome {
    /// Pass-through outcome
    #[must_use]
    pub fn no_providers() -> Self {
        Self {
            chosen: None,
            reason: SelectionReason::NoProviders,
        }
    }

    /// Name of the chosen provider
    #[must_use]
    pub fn provider_name(&self) -> Option<&str> {
        self.chosen.as_ref().map(|p| p.name.as_str())
    }
}

/// Choose a provider for one request
pub fn select<R: Rng + ?Sized>(
    providers: &[ProviderSpec],
    snapshot: &MetricSnapshot,
    rng: &mut R,
) -> SelectionOutcome {
    if providers.is_empty() {
        return SelectionOutcome::no_providers();
    }

    let readings = match snapshot {
        MetricSnapshot::Readings(readings) => readings,
        MetricSnapshot::Unavailable => return random_fallback(providers, rng),
    };

    match lowest_metric(providers, readings) {
        Some(index) => SelectionOutcome {
            chosen: Some(providers[index].clone()),
            reason: SelectionReason::LowestMetric,
        },
        None => random_fallback(providers, rng),
    }
}

/// Index of the lowest usable reading, first-seen wins on ties
///
/// Only positions present in both slices are considered.
#[must_use]
pub fn lowest_metric(providers: &[ProviderSpec], readings: &[MetricReading]) -> Option<usize> {
    let mut best: Option<(usize, i64)> = None;
    for (index, reading) in readings.iter().take(providers.len()).enumerate() {
        let Some(value) = reading.value() else {
            continue;
        };
        // Strict `<`: an equal value later in the list never displaces the earlier one.
        if best.map_or(true, |(_, min)| value < min) {
            best = Some((index, value));
        }
    }
    best.map(|(index, _)| index)
}

/// Uniform random pick over all providers
///
/// `providers` must be non-empty; an empty slice yields `NoProviders`.
pub fn random_fallback<R: Rng + ?Sized>(providers: &[ProviderSpec], rng: &mut R) -> SelectionOutcome {
    if providers.is_empty() {
        return SelectionOutcome::no_providers();
    }
    let index = rng.gen_range(0..providers.len());
    SelectionOutcome {
        chosen: Some(providers[index].clone()),
        reason: SelectionReason::RandomFallback,
    }
}
