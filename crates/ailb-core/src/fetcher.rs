//! Metric Fetcher
//!
//! Builds the ordered key list for a route and issues the single batched
//! read per request. Holds no state between requests.

use crate::config::ProviderSpec;
use crate::store::{MetricStore, ReplyCallback, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Lookup keys for `providers`, in provider order
#[must_use]
pub fn metric_keys(providers: &[ProviderSpec], key_prefix: &str) -> Vec<String> {
    providers
        .iter()
        .map(|p| format!("{}{}", key_prefix, p.metric_key))
        .collect()
}

/// Issues batched metric reads against a store
#[derive(Clone)]
pub struct MetricFetcher {
    store: Arc<dyn MetricStore>,
}

impl MetricFetcher {
    /// Create a fetcher over `store`
    #[must_use]
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Issue one batched read; `on_reply` fires once if this returns `Ok`
    ///
    /// # Errors
    ///
    /// Propagates the store's initiation failure. The caller treats it as
    /// "no metrics available" and does not retry.
    pub fn fetch(&self, keys: Vec<String>, on_reply: ReplyCallback) -> Result<(), StoreError> {
        debug!(keys = keys.len(), "Fetching provider metrics");
        self.store.batch_get(keys, on_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockMetricStore, StoreReply};
    use std::sync::mpsc;

    #[test]
    fn test_metric_keys_prefixed_in_order() {
        let providers = vec![
            ProviderSpec::new("A", "k1"),
            ProviderSpec::new("B", "k2"),
            ProviderSpec::new("C", "k3"),
        ];
        assert_eq!(metric_keys(&providers, "m:"), vec!["m:k1", "m:k2", "m:k3"]);
        assert_eq!(metric_keys(&providers, ""), vec!["k1", "k2", "k3"]);
        assert!(metric_keys(&[], "m:").is_empty());
    }

    #[test]
    fn test_fetch_issues_one_batched_read() {
        let mut store = MockMetricStore::new();
        store
            .expect_batch_get()
            .withf(|keys, _| *keys == ["m:k1", "m:k2"])
            .times(1)
            .returning(|_, on_reply| {
                on_reply(Ok(StoreReply::Array(vec![Some("3".into()), None])));
                Ok(())
            });

        let fetcher = MetricFetcher::new(Arc::new(store));
        let (tx, rx) = mpsc::channel();
        fetcher
            .fetch(
                vec!["m:k1".into(), "m:k2".into()],
                Box::new(move |response| tx.send(response).unwrap()),
            )
            .unwrap();

        let response = rx.recv().unwrap();
        assert_eq!(
            response,
            Ok(StoreReply::Array(vec![Some("3".to_string()), None]))
        );
    }

    #[test]
    fn test_fetch_propagates_initiation_failure() {
        let mut store = MockMetricStore::new();
        store
            .expect_batch_get()
            .returning(|_, _| Err(StoreError::Unavailable("no connection".into())));

        let fetcher = MetricFetcher::new(Arc::new(store));
        let result = fetcher.fetch(vec!["k".into()], Box::new(|_| panic!("must not fire")));
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
