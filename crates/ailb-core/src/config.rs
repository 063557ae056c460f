//! Route configuration
//!
//! `RawConfig` is the typed schema of the route payload handed over by the
//! gateway (or loaded by the CLI). It is resolved exactly once into an
//! immutable [`RoutingConfig`], which is then shared read-only by every
//! request on the route.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info};

/// Default metric store port
pub const DEFAULT_REDIS_PORT: u16 = 6379;
/// Default metric store read timeout (milliseconds)
pub const DEFAULT_REDIS_TIMEOUT_MS: u64 = 1000;
/// Default prefix prepended to every provider metric key
pub const DEFAULT_KEY_PREFIX: &str = "ai_metric:";
/// Default name of the routing header
pub const DEFAULT_TARGET_HEADER: &str = "x-selected-provider";
/// Default body field rewritten by the body phase
pub const DEFAULT_REWRITE_FIELD: &str = "model";
/// Default decoder buffer requested from the host when bodies are rewritten
pub const DEFAULT_BODY_BUFFER_LIMIT: usize = 10 * 1024 * 1024;

// ============================================================================
// Raw schema
// ============================================================================

/// Metric store connection options as they appear in the payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRedisConfig {
    /// Store host / service name (required)
    #[serde(default)]
    pub service_name: Option<String>,
    /// Store port
    #[serde(default)]
    pub service_port: Option<u16>,
    /// ACL username
    #[serde(default)]
    pub username: Option<String>,
    /// ACL password
    #[serde(default)]
    pub password: Option<String>,
    /// Read timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// One provider entry as it appears in the payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProvider {
    /// Provider name, written to the routing header
    #[serde(default)]
    pub name: String,
    /// Metric key (without prefix)
    #[serde(default)]
    pub key: String,
    /// Model identifier to carry into the body phase
    #[serde(default)]
    pub model: Option<String>,
}

/// Route configuration payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    /// Metric store options
    #[serde(default)]
    pub redis: RawRedisConfig,
    /// Prefix for metric keys
    #[serde(default)]
    pub redis_key_prefix: Option<String>,
    /// Routing header name
    #[serde(default)]
    pub target_header: Option<String>,
    /// Carrier header name; enables the body phase when set
    #[serde(default)]
    pub rewrite_header: Option<String>,
    /// Body field to rewrite
    #[serde(default)]
    pub rewrite_field: Option<String>,
    /// Body buffer size to request from the host
    #[serde(default)]
    pub body_buffer_limit: Option<usize>,
    /// Ordered provider list
    #[serde(default)]
    pub providers: Vec<RawProvider>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// A backend provider eligible for selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSpec {
    /// Unique, non-empty provider name
    pub name: String,
    /// Metric key, without the route prefix
    pub metric_key: String,
    /// Optional model identifier for the body rewrite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProviderSpec {
    /// Create a provider without a model identifier
    #[must_use]
    pub fn new(name: impl Into<String>, metric_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_key: metric_key.into(),
            model: None,
        }
    }

    /// Attach a model identifier
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Metric store connection parameters
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct StoreParams {
    /// Host / service name
    pub service_name: String,
    /// Port
    pub service_port: u16,
    /// ACL username
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// ACL password (never serialized)
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl fmt::Debug for StoreParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreParams")
            .field("service_name", &self.service_name)
            .field("service_port", &self.service_port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Body rewrite settings (present only when the body phase is enabled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteConfig {
    /// Header that carries the chosen model between phases
    pub carrier_header: String,
    /// Top-level JSON field to overwrite
    pub field: String,
    /// Decoder buffer size to request from the host
    pub buffer_limit: usize,
}

/// Immutable per-route configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingConfig {
    /// Providers, in metric-read order
    pub providers: Vec<ProviderSpec>,
    /// Prefix prepended to each provider's metric key
    pub key_prefix: String,
    /// Header receiving the chosen provider name
    pub routing_header: String,
    /// Body rewrite settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteConfig>,
    /// Store connection; `None` only for the inert configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreParams>,
}

impl RoutingConfig {
    /// Resolve defaults and validate a raw payload
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `redis.service_name` is missing, a provider
    /// has no name, or two providers share a name.
    pub fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let service_name = non_empty(raw.redis.service_name)
            .ok_or(ConfigError::MissingField("redis.service_name"))?;

        let store = StoreParams {
            service_name,
            service_port: raw.redis.service_port.unwrap_or(DEFAULT_REDIS_PORT),
            username: non_empty(raw.redis.username),
            password: non_empty(raw.redis.password),
            timeout_ms: raw.redis.timeout.unwrap_or(DEFAULT_REDIS_TIMEOUT_MS),
        };

        let mut seen = HashSet::new();
        let mut providers = Vec::with_capacity(raw.providers.len());
        for (index, p) in raw.providers.into_iter().enumerate() {
            if p.name.is_empty() {
                return Err(ConfigError::EmptyProviderName { index });
            }
            if !seen.insert(p.name.clone()) {
                return Err(ConfigError::DuplicateProvider(p.name));
            }
            providers.push(ProviderSpec {
                name: p.name,
                metric_key: p.key,
                model: non_empty(p.model),
            });
        }

        let rewrite = non_empty(raw.rewrite_header).map(|carrier_header| RewriteConfig {
            carrier_header,
            field: non_empty(raw.rewrite_field)
                .unwrap_or_else(|| DEFAULT_REWRITE_FIELD.to_string()),
            buffer_limit: raw.body_buffer_limit.unwrap_or(DEFAULT_BODY_BUFFER_LIMIT),
        });

        Ok(Self {
            providers,
            // An explicit empty prefix is honoured; only an absent one defaults.
            key_prefix: raw
                .redis_key_prefix
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            routing_header: non_empty(raw.target_header)
                .unwrap_or_else(|| DEFAULT_TARGET_HEADER.to_string()),
            rewrite,
            store: Some(store),
        })
    }

    /// Parse and resolve a JSON route payload
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the payload does not fit the schema,
    /// otherwise the errors of [`RoutingConfig::from_raw`].
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Resolve a payload, degrading to the inert configuration on error
    ///
    /// A broken route must not block its traffic: the error is logged and
    /// the route forwards requests untouched.
    #[must_use]
    pub fn load_or_inert(value: &serde_json::Value) -> Self {
        match Self::from_json(value) {
            Ok(config) => {
                info!(
                    providers = config.providers.len(),
                    prefix = %config.key_prefix,
                    header = %config.routing_header,
                    rewrite = config.rewrite.is_some(),
                    "Route configuration loaded"
                );
                config
            }
            Err(e) => {
                error!(error = %e, "Rejecting route configuration, requests will pass through");
                Self::inert()
            }
        }
    }

    /// Configuration with no providers and no store: every request passes through
    #[must_use]
    pub fn inert() -> Self {
        Self {
            providers: Vec::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            routing_header: DEFAULT_TARGET_HEADER.to_string(),
            rewrite: None,
            store: None,
        }
    }

    /// True when no selection will ever be attempted
    #[must_use]
    pub fn is_inert(&self) -> bool {
        self.providers.is_empty()
    }

    /// True when the body phase may rewrite payloads on this route
    #[must_use]
    pub fn rewrites_body(&self) -> bool {
        self.rewrite.is_some() && self.providers.iter().any(|p| p.model.is_some())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
