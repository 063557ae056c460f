//! Redis-backed metric store

use crate::error::{Error, Result};
use crate::reply::decode_reply;
use ailb_core::{MetricStore, ReplyCallback, StoreError, StoreParams, StoreReply};
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// Build the `redis://` URL for the given parameters
///
/// Username and password are percent-encoded.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if the host cannot form a URL.
pub fn connection_url(params: &StoreParams) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "redis://{}:{}",
        params.service_name, params.service_port
    ))
    .map_err(|e| Error::InvalidAddress(format!("{}: {}", params.service_name, e)))?;

    if let Some(username) = &params.username {
        url.set_username(username)
            .map_err(|_| Error::InvalidAddress("cannot set username".to_string()))?;
    }
    if let Some(password) = &params.password {
        url.set_password(Some(password))
            .map_err(|_| Error::InvalidAddress("cannot set password".to_string()))?;
    }
    Ok(url)
}

/// Metric store reading utilization values with `MGET`
///
/// Cheap to share: one multiplexed connection is opened lazily and reused by
/// every request on the route. A connection that fails is dropped and
/// re-established on the next read.
#[derive(Clone)]
pub struct RedisMetricStore {
    inner: Arc<Inner>,
}

struct Inner {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
    timeout_ms: u64,
}

impl RedisMetricStore {
    /// Create a store for the route's connection parameters
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters do not form a valid Redis address.
    pub fn from_params(params: &StoreParams) -> Result<Self> {
        let url = connection_url(params)?;
        let client =
            redis::Client::open(url.as_str()).map_err(|e| Error::InvalidAddress(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                connection: Mutex::new(None),
                timeout_ms: params.timeout_ms,
            }),
        })
    }

    /// Read timeout in milliseconds
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.inner.timeout_ms
    }

    /// Run one `MGET` with the configured timeout
    ///
    /// # Errors
    ///
    /// Returns connection, command or timeout errors.
    pub async fn mget(&self, keys: &[String]) -> Result<StoreReply> {
        self.inner.mget(keys).await
    }
}

impl Inner {
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        debug!("Redis connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_connection(&self) {
        self.connection.lock().await.take();
    }

    async fn mget(&self, keys: &[String]) -> Result<StoreReply> {
        if keys.is_empty() {
            return Ok(StoreReply::Array(Vec::new()));
        }

        let read = async {
            let mut conn = self.connection().await?;
            let value: redis::Value = redis::cmd("MGET")
                .arg(keys)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    if e.is_connection_dropped() || e.is_io_error() {
                        Error::Connection(e.to_string())
                    } else {
                        Error::Command(e.to_string())
                    }
                })?;
            Ok(decode_reply(value))
        };

        let result = match tokio::time::timeout(Duration::from_millis(self.timeout_ms), read).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout_ms)),
        };

        if matches!(result, Err(Error::Connection(_)) | Err(Error::Timeout(_))) {
            self.reset_connection().await;
        }
        result
    }
}

impl MetricStore for RedisMetricStore {
    fn batch_get(
        &self,
        keys: Vec<String>,
        on_reply: ReplyCallback,
    ) -> std::result::Result<(), StoreError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let inner = Arc::clone(&self.inner);

        runtime.spawn(async move {
            let response = inner.mget(&keys).await.map_err(|e| {
                warn!(error = %e, keys = keys.len(), "Redis MGET failed");
                StoreError::from(e)
            });
            on_reply(response);
        });
        Ok(())
    }
}
