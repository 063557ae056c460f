//! `ailb select`

use crate::loader::load_route;
use ailb_core::{
    FilterAction, HostRequest, LoadBalancer, MemoryRequest, RequestContext, RoutingConfig,
};
use ailb_redis::RedisMetricStore;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Slack on top of the store timeout before giving up on the resume
const RESUME_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
struct Report {
    provider: Option<String>,
    reason: Option<String>,
    paused: bool,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<serde_json::Value>,
}

pub async fn run(route: &Path, body: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let raw = load_route(route)?;
    let config = RoutingConfig::from_raw(raw).context("Invalid route configuration")?;
    let params = config
        .store
        .clone()
        .context("Route has no metric store configured")?;

    let body = match body {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("Failed to read body file {}", path.display()))?,
        ),
        None => None,
    };

    let store = RedisMetricStore::from_params(&params)?;
    let lb = LoadBalancer::new(Arc::new(config), Arc::new(store));

    let request = Arc::new(MemoryRequest::with_headers([(
        "content-type",
        "application/json",
    )]));
    if let Some(body) = &body {
        request.set_header("content-length", &body.len().to_string());
    }

    let mut ctx = RequestContext::new();
    let action = lb.on_request_headers(&mut ctx, request.clone());
    if action == FilterAction::Pause {
        let wait = Duration::from_millis(params.timeout_ms) + RESUME_GRACE;
        debug!(wait_ms = wait.as_millis() as u64, "Waiting for metric read");
        tokio::time::timeout(wait, request.resumed())
            .await
            .context("Request was not resumed in time")?;
    }

    if let Some(body) = &body {
        lb.on_request_body(&ctx, request.as_ref(), body);
    }

    let outcome = ctx.outcome();
    let final_body = request.replaced_body().or(body);
    let report = Report {
        provider: outcome
            .as_ref()
            .and_then(|o| o.provider_name())
            .map(str::to_string),
        reason: outcome.as_ref().map(|o| o.reason.to_string()),
        paused: action == FilterAction::Pause,
        headers: request.headers(),
        body: final_body.as_deref().map(|b| {
            serde_json::from_slice(b).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(b).into_owned())
            })
        }),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match (&report.provider, &report.reason) {
        (Some(provider), Some(reason)) => println!("Provider: {} ({})", provider, reason),
        (None, Some(reason)) => println!("Provider: none ({})", reason),
        _ => println!("Provider: none (request passed through)"),
    }
    println!("\nHeaders:");
    for (name, value) in &report.headers {
        println!("  {}: {}", name, value);
    }
    if let Some(body) = &report.body {
        println!("\nBody:\n{}", serde_json::to_string_pretty(body)?);
    }
    Ok(())
}
