//! Suspension Controller
//!
//! Explicit state machine for holding a request while its metric read is
//! outstanding:
//!
//! ```text
//! Idle --pause--> AwaitingMetrics --{MetricsReady | MetricsFailed | InitiationFailed}--> Resumed
//! ```
//!
//! `pause` hands out a [`ResumeToken`]. The token is the only way into
//! `Resumed` and is consumed by value, so a request is resumed at most once.
//! Dropping an unused token resumes the request as well, so it is also
//! resumed at least once.

use crate::error::SuspensionError;
use crate::host::HostRequest;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Lifecycle of one request's suspension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionState {
    /// Not paused yet
    Idle,
    /// Held by the host while the metric read is in flight
    AwaitingMetrics,
    /// Released; terminal
    Resumed,
}

/// What moved the request into [`SuspensionState::Resumed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeEvent {
    /// Store answered (any shape)
    MetricsReady,
    /// Store reported a transport error
    MetricsFailed,
    /// The read could not be started; the phase continues inline
    InitiationFailed,
    /// Token dropped without being used
    Abandoned,
}

/// Per-request suspension state machine
#[derive(Debug, Clone)]
pub struct Suspension {
    state: Arc<Mutex<SuspensionState>>,
    last_event: Arc<Mutex<Option<ResumeEvent>>>,
}

impl Default for Suspension {
    fn default() -> Self {
        Self::new()
    }
}

impl Suspension {
    /// New, idle suspension
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SuspensionState::Idle)),
            last_event: Arc::new(Mutex::new(None)),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SuspensionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Event that resumed the request, once resumed
    #[must_use]
    pub fn resume_event(&self) -> Option<ResumeEvent> {
        *self.last_event.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move `Idle -> AwaitingMetrics` and take the one-shot resume token
    ///
    /// # Errors
    ///
    /// Fails if the request was already paused or resumed.
    pub fn pause(&self, host: Arc<dyn HostRequest>) -> Result<ResumeToken, SuspensionError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match *state {
            SuspensionState::Idle => {
                *state = SuspensionState::AwaitingMetrics;
                debug!("Request paused awaiting metrics");
                Ok(ResumeToken {
                    host: Some(host),
                    suspension: self.clone(),
                })
            }
            SuspensionState::AwaitingMetrics => Err(SuspensionError::AlreadyPaused),
            SuspensionState::Resumed => Err(SuspensionError::AlreadyResumed),
        }
    }

    fn finish(&self, event: ResumeEvent) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SuspensionState::Resumed;
        *self.last_event.lock().unwrap_or_else(|e| e.into_inner()) = Some(event);
    }
}

/// One-shot permission to resume a paused request
pub struct ResumeToken {
    host: Option<Arc<dyn HostRequest>>,
    suspension: Suspension,
}

impl ResumeToken {
    /// Resume the held request through the host
    pub fn resume(mut self, event: ResumeEvent) {
        if let Some(host) = self.host.take() {
            self.suspension.finish(event);
            debug!(event = ?event, "Resuming request");
            host.resume();
        }
    }

    /// Mark the suspension finished without calling the host
    ///
    /// Used when the phase that paused is still on the stack and will return
    /// [`FilterAction::Continue`](crate::host::FilterAction::Continue) itself,
    /// which releases the request.
    pub fn release_inline(mut self, event: ResumeEvent) {
        if self.host.take().is_some() {
            self.suspension.finish(event);
            debug!(event = ?event, "Suspension released inline");
        }
    }
}

impl Drop for ResumeToken {
    fn drop(&mut self) {
        if let Some(host) = self.host.take() {
            error!("Resume token dropped while request was paused, resuming");
            self.suspension.finish(ResumeEvent::Abandoned);
            host.resume();
        }
    }
}

impl std::fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeToken")
            .field("pending", &self.host.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryRequest;

    fn host() -> Arc<MemoryRequest> {
        Arc::new(MemoryRequest::new())
    }

    #[test]
    fn test_pause_then_resume() {
        let request = host();
        let suspension = Suspension::new();
        assert_eq!(suspension.state(), SuspensionState::Idle);

        let token = suspension.pause(request.clone()).unwrap();
        assert_eq!(suspension.state(), SuspensionState::AwaitingMetrics);
        assert_eq!(request.resume_count(), 0);

        token.resume(ResumeEvent::MetricsReady);
        assert_eq!(suspension.state(), SuspensionState::Resumed);
        assert_eq!(suspension.resume_event(), Some(ResumeEvent::MetricsReady));
        assert_eq!(request.resume_count(), 1);
    }

    #[test]
    fn test_double_pause_rejected() {
        let suspension = Suspension::new();
        let token = suspension.pause(host()).unwrap();
        assert_eq!(
            suspension.pause(host()).unwrap_err(),
            SuspensionError::AlreadyPaused
        );

        token.resume(ResumeEvent::MetricsFailed);
        assert_eq!(
            suspension.pause(host()).unwrap_err(),
            SuspensionError::AlreadyResumed
        );
    }

    #[test]
    fn test_dropped_token_resumes_once() {
        let request = host();
        let suspension = Suspension::new();
        drop(suspension.pause(request.clone()).unwrap());

        assert_eq!(request.resume_count(), 1);
        assert_eq!(suspension.state(), SuspensionState::Resumed);
        assert_eq!(suspension.resume_event(), Some(ResumeEvent::Abandoned));
    }

    #[test]
    fn test_release_inline_skips_host() {
        let request = host();
        let suspension = Suspension::new();
        let token = suspension.pause(request.clone()).unwrap();

        token.release_inline(ResumeEvent::InitiationFailed);
        assert_eq!(request.resume_count(), 0);
        assert_eq!(suspension.state(), SuspensionState::Resumed);
        assert_eq!(suspension.resume_event(), Some(ResumeEvent::InitiationFailed));
    }

    #[test]
    fn test_clones_share_state() {
        let suspension = Suspension::new();
        let observer = suspension.clone();
        suspension
            .pause(host())
            .unwrap()
            .resume(ResumeEvent::MetricsReady);
        assert_eq!(observer.state(), SuspensionState::Resumed);
    }
}
