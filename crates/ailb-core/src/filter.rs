//! Per-route filter
//!
//! Wires the pipeline together for one route:
//! header phase -> Metric Fetcher -> (suspend) -> Selection Engine ->
//! Request Steering -> resume, then an optional body phase.
//!
//! The filter holds only the read-only configuration and the store handle.
//! Everything per-request lives in [`RequestContext`].

use crate::config::RoutingConfig;
use crate::error::Error;
use crate::fetcher::{metric_keys, MetricFetcher};
use crate::host::{FilterAction, HostRequest};
use crate::metric::MetricSnapshot;
use crate::selection::{select, SelectionOutcome};
use crate::steering;
use crate::store::{MetricStore, StoreResponse};
use crate::suspension::{ResumeEvent, ResumeToken, Suspension, SuspensionState};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Randomness used by the random fallback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RngSource {
    /// Thread-local generator
    #[default]
    Thread,
    /// Fresh `StdRng` seeded per request (deterministic tests)
    Seeded(u64),
}

impl RngSource {
    fn with_rng<T>(self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match self {
            Self::Thread => f(&mut rand::thread_rng()),
            Self::Seeded(seed) => f(&mut StdRng::seed_from_u64(seed)),
        }
    }
}

#[derive(Debug, Default)]
struct Scratch {
    model: Option<String>,
    outcome: Option<SelectionOutcome>,
}

/// State carried from the header phase to the body phase of one request
#[derive(Debug, Default)]
pub struct RequestContext {
    suspension: Suspension,
    scratch: Arc<Mutex<Scratch>>,
}

impl RequestContext {
    /// Fresh context for a new request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspension state machine for this request
    #[must_use]
    pub fn suspension(&self) -> &Suspension {
        &self.suspension
    }

    /// Model chosen in the header phase, if any
    #[must_use]
    pub fn carried_model(&self) -> Option<String> {
        self.scratch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .model
            .clone()
    }

    /// Selection outcome, once the header phase has completed
    #[must_use]
    pub fn outcome(&self) -> Option<SelectionOutcome> {
        self.scratch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .outcome
            .clone()
    }
}

/// Metric-driven provider selection for one route
pub struct LoadBalancer {
    config: Arc<RoutingConfig>,
    fetcher: Option<MetricFetcher>,
    rng: RngSource,
}

impl LoadBalancer {
    /// Create a filter for `config` backed by `store`
    #[must_use]
    pub fn new(config: Arc<RoutingConfig>, store: Arc<dyn MetricStore>) -> Self {
        Self {
            config,
            fetcher: Some(MetricFetcher::new(store)),
            rng: RngSource::Thread,
        }
    }

    /// Filter that lets every request through untouched
    #[must_use]
    pub fn pass_through() -> Self {
        Self {
            config: Arc::new(RoutingConfig::inert()),
            fetcher: None,
            rng: RngSource::Thread,
        }
    }

    /// Override the random source
    #[must_use]
    pub fn with_rng(mut self, rng: RngSource) -> Self {
        self.rng = rng;
        self
    }

    /// Route configuration
    #[must_use]
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Header phase
    ///
    /// Returns [`FilterAction::Pause`] when a metric read was started; the
    /// request is then resumed exactly once from the read's callback.
    /// Returns [`FilterAction::Continue`] when there is nothing to decide or
    /// the read could not be started.
    pub fn on_request_headers(
        &self,
        ctx: &mut RequestContext,
        host: Arc<dyn HostRequest>,
    ) -> FilterAction {
        if ctx.suspension.state() == SuspensionState::Idle {
            steering::clear_carrier(&self.config, host.as_ref());
        }

        let Some(fetcher) = self.fetcher.as_ref().filter(|_| !self.config.is_inert()) else {
            debug!("No providers configured, passing request through");
            return FilterAction::Continue;
        };

        let token = match ctx.suspension.pause(Arc::clone(&host)) {
            Ok(token) => token,
            Err(e) => {
                let err = Error::from(e);
                warn!(error = %err, "Header phase entered twice, passing request through");
                return FilterAction::Continue;
            }
        };

        let keys = metric_keys(&self.config.providers, &self.config.key_prefix);
        let slot: TokenSlot = Arc::new(Mutex::new(Some(token)));
        let pending = PendingSelection {
            config: Arc::clone(&self.config),
            host,
            scratch: Arc::clone(&ctx.scratch),
            token: Arc::clone(&slot),
            keys: keys.clone(),
            rng: self.rng,
        };

        match fetcher.fetch(keys, Box::new(move |response| pending.complete(response))) {
            Ok(()) => FilterAction::Pause,
            Err(e) => {
                let err = Error::from(e);
                warn!(error = %err, "Metric read not started, passing request through");
                match take_token(&slot) {
                    Some(token) => {
                        token.release_inline(ResumeEvent::InitiationFailed);
                        FilterAction::Continue
                    }
                    // The callback already ran and resumed the request.
                    None => FilterAction::Pause,
                }
            }
        }
    }

    /// Body phase
    ///
    /// Best effort: a body that cannot take the rewrite is forwarded as is.
    pub fn on_request_body(
        &self,
        ctx: &RequestContext,
        host: &dyn HostRequest,
        body: &[u8],
    ) -> FilterAction {
        steering::apply_body_rewrite(&self.config, ctx.carried_model(), body, host);
        FilterAction::Continue
    }
}

type TokenSlot = Arc<Mutex<Option<ResumeToken>>>;

fn take_token(slot: &TokenSlot) -> Option<ResumeToken> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// Everything the read callback needs to finish the header phase
struct PendingSelection {
    config: Arc<RoutingConfig>,
    host: Arc<dyn HostRequest>,
    scratch: Arc<Mutex<Scratch>>,
    token: TokenSlot,
    keys: Vec<String>,
    rng: RngSource,
}

impl PendingSelection {
    fn complete(self, response: StoreResponse) {
        let event = if response.is_ok() {
            ResumeEvent::MetricsReady
        } else {
            ResumeEvent::MetricsFailed
        };

        steering::prepare_body_phase(&self.config, self.host.as_ref());

        let snapshot = MetricSnapshot::from_response(&self.keys, response);
        let outcome = self
            .rng
            .with_rng(|rng| select(&self.config.providers, &snapshot, rng));
        let model = steering::apply_outcome(&self.config, &outcome, self.host.as_ref());

        info!(
            provider = outcome.provider_name().unwrap_or("-"),
            reason = %outcome.reason,
            "Provider selected"
        );

        {
            let mut scratch = self.scratch.lock().unwrap_or_else(|e| e.into_inner());
            scratch.model = model;
            scratch.outcome = Some(outcome);
        }

        if let Some(token) = take_token(&self.token) {
            token.resume(event);
        }
    }
}
