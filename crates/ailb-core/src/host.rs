//! Host runtime contract
//!
//! The gateway that owns the in-flight request suspends and resumes it and
//! exposes header/body mutation. Everything the core needs from it is in
//! [`HostRequest`]. [`MemoryRequest`] is an in-process implementation used by
//! the CLI and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Control signal returned from a phase callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Forward the request now
    Continue,
    /// Hold the request until [`HostRequest::resume`] is called
    Pause,
}

/// Operations on one in-flight request
///
/// Methods take `&self` because the resume path runs inside a store
/// callback, detached from the phase call that paused the request.
pub trait HostRequest: Send + Sync {
    /// Header value by exact (case-insensitive) name
    fn header(&self, name: &str) -> Option<String>;

    /// Set or replace a header
    fn set_header(&self, name: &str, value: &str);

    /// Remove a header if present
    fn remove_header(&self, name: &str);

    /// Replace the whole request body
    fn replace_body(&self, body: Vec<u8>);

    /// Ask the host to buffer up to `bytes` of body before the body phase
    fn set_body_buffer_limit(&self, _bytes: usize) {}

    /// Resume a request previously held with [`FilterAction::Pause`]
    fn resume(&self);
}

/// In-memory request used by the CLI and tests
#[derive(Default)]
pub struct MemoryRequest {
    headers: Mutex<BTreeMap<String, String>>,
    body: Mutex<Option<Vec<u8>>>,
    buffer_limit: Mutex<Option<usize>>,
    resumes: AtomicUsize,
    resumed: Notify,
}

impl MemoryRequest {
    /// Create an empty request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a request with the given headers
    #[must_use]
    pub fn with_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let request = Self::new();
        for (name, value) in headers {
            request.set_header(name, value);
        }
        request
    }

    /// Snapshot of all headers (names lowercased)
    #[must_use]
    pub fn headers(&self) -> BTreeMap<String, String> {
        self.headers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Body set through [`HostRequest::replace_body`], if any
    #[must_use]
    pub fn replaced_body(&self) -> Option<Vec<u8>> {
        self.body.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Buffer limit requested by the filter, if any
    #[must_use]
    pub fn buffer_limit(&self) -> Option<usize> {
        *self.buffer_limit.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// How many times the request was resumed
    #[must_use]
    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    /// Wait until the request has been resumed at least once
    pub async fn resumed(&self) {
        if self.resume_count() > 0 {
            return;
        }
        self.resumed.notified().await;
    }
}

impl HostRequest for MemoryRequest {
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    fn set_header(&self, name: &str, value: &str) {
        self.headers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    fn remove_header(&self, name: &str) {
        self.headers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&name.to_ascii_lowercase());
    }

    fn replace_body(&self, body: Vec<u8>) {
        *self.body.lock().unwrap_or_else(|e| e.into_inner()) = Some(body);
    }

    fn set_body_buffer_limit(&self, bytes: usize) {
        *self.buffer_limit.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
    }

    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        self.resumed.notify_one();
    }
}
