//! End-to-end tests for the selection pipeline
//!
//! Runs route payloads through the public API with an in-process metric
//! store standing in for Redis.

use ailb_core::{
    FilterAction, HostRequest, LoadBalancer, MemoryRequest, MetricStore, ReplyCallback,
    RequestContext, ResumeEvent, RngSource, RoutingConfig, SelectionReason, StoreError,
    StoreReply, SuspensionState,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Test store
// ============================================================================

enum Behavior {
    Values(HashMap<String, String>),
    Fail(StoreError),
    NonArray,
    Refuse,
}

/// Metric store answering from a table on a spawned task
struct TableStore {
    behavior: Behavior,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<String>>>,
}

impl TableStore {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn values(pairs: &[(&str, &str)]) -> Arc<Self> {
        Self::new(Behavior::Values(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricStore for TableStore {
    fn batch_get(&self, keys: Vec<String>, on_reply: ReplyCallback) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(keys.clone());

        let response = match &self.behavior {
            Behavior::Refuse => return Err(StoreError::Unavailable("not connected".into())),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::NonArray => Ok(StoreReply::NonArray),
            Behavior::Values(table) => Ok(StoreReply::Array(
                keys.iter().map(|k| table.get(k).cloned()).collect(),
            )),
        };

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2)).await;
            on_reply(response);
        });
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn route(rewrite: bool) -> RoutingConfig {
    let mut payload = json!({
        "redis": { "service_name": "redis.default.svc" },
        "redis_key_prefix": "m:",
        "providers": [
            { "name": "A", "key": "k1" },
            { "name": "B", "key": "k2", "model": "gpt-x" },
            { "name": "C", "key": "k3" }
        ]
    });
    if rewrite {
        payload["rewrite_header"] = json!("x-rewrite-target-model");
    }
    RoutingConfig::from_json(&payload).unwrap()
}

struct Run {
    ctx: RequestContext,
    request: Arc<MemoryRequest>,
    action: FilterAction,
}

async fn run_headers(lb: &LoadBalancer) -> Run {
    let mut ctx = RequestContext::new();
    let request = Arc::new(MemoryRequest::with_headers([
        ("content-type", "application/json"),
        ("content-length", "58"),
    ]));
    let action = lb.on_request_headers(&mut ctx, request.clone());
    if action == FilterAction::Pause {
        tokio::time::timeout(Duration::from_secs(2), request.resumed())
            .await
            .expect("request left paused");
    }
    Run {
        ctx,
        request,
        action,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_lowest_metric_sets_routing_header() {
    let store = TableStore::values(&[("m:k1", "42"), ("m:k2", "17"), ("m:k3", "17")]);
    let lb = LoadBalancer::new(Arc::new(route(false)), store.clone());

    let run = run_headers(&lb).await;

    assert_eq!(run.action, FilterAction::Pause);
    assert_eq!(
        store.seen.lock().unwrap().as_slice(),
        &[vec!["m:k1".to_string(), "m:k2".into(), "m:k3".into()]]
    );
    assert_eq!(run.request.header("x-selected-provider").as_deref(), Some("B"));
    assert_eq!(run.ctx.outcome().unwrap().reason, SelectionReason::LowestMetric);
    assert_eq!(run.request.resume_count(), 1);
}

#[tokio::test]
async fn test_same_readings_pick_same_provider() {
    let store = TableStore::values(&[("m:k1", "9"), ("m:k2", "3"), ("m:k3", "5")]);
    let lb = LoadBalancer::new(Arc::new(route(false)), store);

    let first = run_headers(&lb).await;
    let second = run_headers(&lb).await;
    assert_eq!(
        first.ctx.outcome().unwrap().chosen,
        second.ctx.outcome().unwrap().chosen
    );
}

#[tokio::test]
async fn test_carrier_and_rewrite() {
    let store = TableStore::values(&[("m:k1", "42"), ("m:k2", "17"), ("m:k3", "17")]);
    let lb = LoadBalancer::new(Arc::new(route(true)), store);

    let run = run_headers(&lb).await;
    assert_eq!(
        run.request.header("x-rewrite-target-model").as_deref(),
        Some("gpt-x")
    );
    assert!(run.request.header("content-length").is_none());

    let body = br#"{"model":"old","messages":[{"role":"user","content":"hello"}]}"#;
    let action = lb.on_request_body(&run.ctx, run.request.as_ref(), body);

    assert_eq!(action, FilterAction::Continue);
    let rewritten: serde_json::Value =
        serde_json::from_slice(&run.request.replaced_body().unwrap()).unwrap();
    assert_eq!(
        rewritten,
        json!({"model": "gpt-x", "messages": [{"role": "user", "content": "hello"}]})
    );
    assert!(run.request.header("x-rewrite-target-model").is_none());
}

#[tokio::test]
async fn test_degraded_reads_fall_back_to_random() {
    let stores = [
        TableStore::new(Behavior::Fail(StoreError::Transport("reset".into()))),
        TableStore::new(Behavior::Fail(StoreError::Timeout(1000))),
        TableStore::new(Behavior::NonArray),
        TableStore::values(&[("m:k1", "busy"), ("m:k3", "")]),
    ];

    for store in stores {
        let lb = LoadBalancer::new(Arc::new(route(false)), store).with_rng(RngSource::Seeded(7));
        let run = run_headers(&lb).await;

        let outcome = run.ctx.outcome().unwrap();
        assert_eq!(outcome.reason, SelectionReason::RandomFallback);
        let chosen = outcome.provider_name().unwrap();
        assert!(["A", "B", "C"].contains(&chosen));
        assert_eq!(
            run.request.header("x-selected-provider").as_deref(),
            Some(chosen)
        );
        assert_eq!(run.request.resume_count(), 1);
    }
}

#[tokio::test]
async fn test_missing_service_name_passes_through() {
    let payload = json!({
        "providers": [{ "name": "A", "key": "k1" }]
    });
    let config = RoutingConfig::load_or_inert(&payload);
    assert!(config.is_inert());

    let store = TableStore::values(&[("ai_metric:k1", "1")]);
    let lb = LoadBalancer::new(Arc::new(config), store.clone());
    let run = run_headers(&lb).await;

    assert_eq!(run.action, FilterAction::Continue);
    assert_eq!(store.calls(), 0);
    assert!(run.request.header("x-selected-provider").is_none());
    assert_eq!(run.request.header("content-length").as_deref(), Some("58"));
}

#[tokio::test]
async fn test_resumed_exactly_once() {
    let cases = [
        ("success", TableStore::values(&[("m:k1", "1")])),
        (
            "store error",
            TableStore::new(Behavior::Fail(StoreError::Transport("eof".into()))),
        ),
        ("initiation failure", TableStore::new(Behavior::Refuse)),
    ];

    for (name, store) in cases {
        let lb = LoadBalancer::new(Arc::new(route(true)), store.clone());
        let run = run_headers(&lb).await;

        // Give a stray late resume a chance to show up.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let releases = run.request.resume_count() + usize::from(run.action == FilterAction::Continue);
        assert_eq!(releases, 1, "{name}: released {releases} times");
        assert_eq!(run.ctx.suspension().state(), SuspensionState::Resumed, "{name}");
        assert_eq!(store.calls(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_initiation_failure_leaves_request_untouched() {
    let lb = LoadBalancer::new(Arc::new(route(true)), TableStore::new(Behavior::Refuse));
    let run = run_headers(&lb).await;

    assert_eq!(run.action, FilterAction::Continue);
    assert_eq!(run.request.resume_count(), 0);
    assert!(run.request.header("x-selected-provider").is_none());
    assert_eq!(run.request.header("content-length").as_deref(), Some("58"));
    assert!(run.request.buffer_limit().is_none());
    assert_eq!(
        run.ctx.suspension().resume_event(),
        Some(ResumeEvent::InitiationFailed)
    );
}

#[tokio::test]
async fn test_empty_prefix_is_kept() {
    let payload = json!({
        "redis": { "service_name": "redis" },
        "redis_key_prefix": "",
        "providers": [{ "name": "A", "key": "k1" }, { "name": "B", "key": "k2" }]
    });
    let store = TableStore::values(&[("k1", "50"), ("k2", "10")]);
    let lb = LoadBalancer::new(
        Arc::new(RoutingConfig::from_json(&payload).unwrap()),
        store.clone(),
    );

    let run = run_headers(&lb).await;
    assert_eq!(run.request.header("x-selected-provider").as_deref(), Some("B"));
    assert_eq!(
        store.seen.lock().unwrap()[0],
        vec!["k1".to_string(), "k2".to_string()]
    );
}
