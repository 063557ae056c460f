//! Request Steering
//!
//! Applies a [`SelectionOutcome`] to the in-flight request (header phase) and
//! performs the optional single-field body rewrite (body phase). Mutations are
//! limited to headers plus at most one body field.

use crate::config::RoutingConfig;
use crate::error::{Error, Result};
use crate::host::HostRequest;
use crate::selection::SelectionOutcome;
use tracing::{debug, warn};

/// Header dropped before a body rewrite, since the body length may change
pub const CONTENT_LENGTH: &str = "content-length";

/// Drop any carrier header the client sent
///
/// Only a value written by [`apply_outcome`] may reach the body phase.
pub fn clear_carrier(config: &RoutingConfig, host: &dyn HostRequest) {
    if let Some(rewrite) = config.rewrite.as_ref() {
        host.remove_header(&rewrite.carrier_header);
    }
}

/// Prepare a request whose body may be rewritten later
///
/// Runs once the metric read has answered, while the request is still held
/// in the header phase. A request released without a read is not touched.
pub fn prepare_body_phase(config: &RoutingConfig, host: &dyn HostRequest) {
    let Some(rewrite) = config.rewrite.as_ref() else {
        return;
    };
    if !config.rewrites_body() {
        return;
    }
    host.remove_header(CONTENT_LENGTH);
    host.set_body_buffer_limit(rewrite.buffer_limit);
}

/// Header-phase write-back
///
/// Returns the model identifier to carry into the body phase, if any.
pub fn apply_outcome(
    config: &RoutingConfig,
    outcome: &SelectionOutcome,
    host: &dyn HostRequest,
) -> Option<String> {
    let provider = outcome.chosen.as_ref()?;

    host.set_header(&config.routing_header, &provider.name);

    let rewrite = config.rewrite.as_ref()?;
    let Some(model) = provider.model.as_ref() else {
        host.remove_header(&rewrite.carrier_header);
        return None;
    };
    host.set_header(&rewrite.carrier_header, model);
    debug!(provider = %provider.name, model = %model, "Carrying model to body phase");
    Some(model.clone())
}

/// Body-phase rewrite
///
/// `carried` is the model recorded in the request context. If it is absent,
/// the carrier header is read instead. The carrier header is always stripped
/// so it never reaches the upstream.
pub fn apply_body_rewrite(
    config: &RoutingConfig,
    carried: Option<String>,
    body: &[u8],
    host: &dyn HostRequest,
) {
    let Some(rewrite) = config.rewrite.as_ref() else {
        return;
    };

    let model = carried
        .or_else(|| host.header(&rewrite.carrier_header))
        .filter(|m| !m.is_empty());

    if let Some(model) = model {
        match rewrite_body(body, &rewrite.field, &model) {
            Ok(new_body) => {
                debug!(field = %rewrite.field, model = %model, "Request body rewritten");
                host.replace_body(new_body);
            }
            Err(e) => warn!(error = %e, "Leaving request body untouched"),
        }
    }

    host.remove_header(&rewrite.carrier_header);
}

/// Set top-level `field` of a JSON object body to `value`
///
/// Other fields keep their order and content.
///
/// # Errors
///
/// Returns [`Error::BodyRewrite`] when the body is not a JSON object.
pub fn rewrite_body(body: &[u8], field: &str, value: &str) -> Result<Vec<u8>> {
    let mut json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::BodyRewrite(e.to_string()))?;

    let object = json
        .as_object_mut()
        .ok_or_else(|| Error::BodyRewrite("body is not a JSON object".to_string()))?;
    object.insert(field.to_string(), serde_json::Value::String(value.to_string()));

    serde_json::to_vec(&json).map_err(|e| Error::BodyRewrite(e.to_string()))
}
