//! Prometheus metrics collection.
//!
//! Provider traffic, cache effectiveness and backfill outcomes, exposed in
//! Prometheus text format.

use prometheus_client::encoding::{EncodeLabelSet, text::encode};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// One remote provider call.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProviderLabels {
    pub provider: String,
    pub operation: String,
    /// `ok` or a `TranslatorError` kind.
    pub outcome: String,
}

/// One backfill decision for an item and locale.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackfillLabels {
    pub kind: String,
    pub outcome: String,
}

/// Application metrics.
pub struct Metrics {
    registry: Registry,

    pub http_requests: Family<HttpLabels, Counter>,

    pub http_duration_seconds: Family<HttpLabels, Histogram>,

    /// Provider calls by provider, operation and outcome.
    pub provider_calls: Family<ProviderLabels, Counter>,

    pub provider_duration_seconds: Family<ProviderLabels, Histogram>,

    /// Stored translations served without a provider call.
    pub cache_hits: Counter,

    pub cache_misses: Counter,

    pub backfill_items: Family<BackfillLabels, Counter>,

    pub rate_limit_rejections: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total HTTP requests",
            http_requests.clone(),
        );

        let http_duration_seconds = Family::<HttpLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 12))
        });
        registry.register(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_duration_seconds.clone(),
        );

        let provider_calls = Family::<ProviderLabels, Counter>::default();
        registry.register(
            "translation_provider_calls",
            "Translation provider calls",
            provider_calls.clone(),
        );

        let provider_duration_seconds =
            Family::<ProviderLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.01, 2.0, 12))
            });
        registry.register(
            "translation_provider_duration_seconds",
            "Translation provider call duration in seconds",
            provider_duration_seconds.clone(),
        );

        let cache_hits = Counter::default();
        registry.register(
            "translation_cache_hits",
            "Stored translations served",
            cache_hits.clone(),
        );

        let cache_misses = Counter::default();
        registry.register(
            "translation_cache_misses",
            "Translations missing or stale in storage",
            cache_misses.clone(),
        );

        let backfill_items = Family::<BackfillLabels, Counter>::default();
        registry.register(
            "backfill_items",
            "Backfill outcomes per item and locale",
            backfill_items.clone(),
        );

        let rate_limit_rejections = Counter::default();
        registry.register(
            "rate_limit_rejections",
            "Rate limit rejections",
            rate_limit_rejections.clone(),
        );

        Self {
            registry,
            http_requests,
            http_duration_seconds,
            provider_calls,
            provider_duration_seconds,
            cache_hits,
            cache_misses,
            backfill_items,
            rate_limit_rejections,
        }
    }

    pub fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests.get_or_create(&labels).inc();
        self.http_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_provider_call(
        &self,
        provider: &str,
        operation: &str,
        outcome: &str,
        duration_secs: f64,
    ) {
        let labels = ProviderLabels {
            provider: provider.to_string(),
            operation: operation.to_string(),
            outcome: outcome.to_string(),
        };

        self.provider_calls.get_or_create(&labels).inc();
        self.provider_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    pub fn record_backfill(&self, kind: &str, outcome: &str) {
        self.backfill_items
            .get_or_create(&BackfillLabels {
                kind: kind.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_rate_limit(&self) {
        self.rate_limit_rejections.inc();
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Panics
    ///
    /// Panics if encoding into a `String` fails, which its `fmt::Write`
    /// impl never does.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        #[allow(clippy::expect_used)]
        encode(&mut buffer, &self.registry).expect("encoding metrics");
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

/// Bound label cardinality and keep the cron key out of labels.
fn normalize_path(path: &str) -> String {
    if path.starts_with("/cron/") {
        return "/cron/{key}".to_string();
    }
    path.split('/')
        .map(|s| {
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                "{id}"
            } else {
                s
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/translate/123"), "/translate/{id}");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/cron/s3cret"), "/cron/{key}");
        assert_eq!(normalize_path("/"), "/");
    }

    #[test]
    fn provider_calls_are_labelled() {
        let metrics = Metrics::new();
        metrics.record_provider_call("deepl", "translate", "ok", 0.2);
        metrics.record_provider_call("deepl", "translate", "rate_limited", 0.1);

        let output = metrics.encode();
        assert!(output.contains("translation_provider_calls_total"));
        assert!(output.contains(r#"outcome="rate_limited""#));
    }

    #[test]
    fn backfill_outcomes_are_counted() {
        let metrics = Metrics::new();
        metrics.record_backfill("post", "translated");
        metrics.record_backfill("post", "translated");

        let output = metrics.encode();
        assert!(output.contains(r#"backfill_items_total{kind="post",outcome="translated"} 2"#));
    }
}
