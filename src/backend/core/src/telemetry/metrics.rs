//! Prometheus metrics for HTTP traffic, authentication and crawl processing.
//!
//! ```rust,ignore
//! use webcrawl_core::telemetry::metrics::CrawlMetrics;
//!
//! CrawlMetrics::record_created();
//! CrawlMetrics::record_finished("done", 5.2);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::sync::OnceLock;

static METRICS_REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
}

/// The installed Prometheus recorder, if any. `/metrics` renders through it.
pub struct MetricsRegistry {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MetricsRegistry {{ enabled: {} }}", self.is_enabled())
    }
}

impl MetricsRegistry {
    /// Empty until [`init_metrics`] has installed a recorder.
    pub fn global() -> &'static MetricsRegistry {
        METRICS_REGISTRY.get_or_init(|| MetricsRegistry { handle: None })
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    /// Prometheus text exposition, or an empty string when disabled.
    pub fn render(&self) -> String {
        match &self.handle {
            Some(handle) => handle.render(),
            None => String::new(),
        }
    }
}

/// Install the global Prometheus recorder.
///
/// Must run before anything calls [`MetricsRegistry::global`]. Fails on
/// invalid buckets or when a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<&'static MetricsRegistry> {
    if !config.enabled {
        tracing::info!("Metrics disabled");
        return Ok(MetricsRegistry::global());
    }

    let handle = PrometheusBuilder::new()
        .add_global_label("service", "webcrawl")
        .set_buckets(&config.duration_buckets)?
        .install_recorder()?;
    describe_metrics();

    METRICS_REGISTRY
        .set(MetricsRegistry {
            handle: Some(handle),
        })
        .map_err(|_| anyhow::anyhow!("metrics registry already initialized"))?;

    tracing::info!(buckets = config.duration_buckets.len(), "Prometheus recorder installed");
    Ok(MetricsRegistry::global())
}

fn describe_metrics() {
    describe_counter!("http_requests_total", "Requests served, by method, route and status");
    describe_histogram!("http_request_duration_seconds", "Request latency in seconds");
    describe_counter!("webcrawl_errors_total", "Error responses, by code");
    describe_counter!("webcrawl_auth_events_total", "Login, register and refresh outcomes");
    describe_counter!("webcrawl_crawls_created_total", "Crawl jobs submitted");
    describe_counter!("webcrawl_crawls_finished_total", "Crawl jobs finished, by final status");
    describe_gauge!("webcrawl_processor_active", "1 while a crawl is being processed");
    describe_histogram!("webcrawl_crawl_duration_seconds", "Seconds from claim to final status");
}

pub struct HttpMetrics;

impl HttpMetrics {
    /// `path` should be the matched route, not the raw URI.
    pub fn record(method: &str, path: &str, status_code: u16, duration_seconds: f64) {
        let labels = [
            ("method", method.to_string()),
            ("path", path.to_string()),
            ("status_code", status_code.to_string()),
        ];
        counter!("http_requests_total", &labels).increment(1);
        histogram!("http_request_duration_seconds", &labels).record(duration_seconds);
    }
}

/// Authentication outcome counters.
pub struct AuthMetrics;

impl AuthMetrics {
    pub fn record(event: &'static str) {
        counter!("webcrawl_auth_events_total", "event" => event).increment(1);
    }
}

/// Crawl lifecycle metrics.
pub struct CrawlMetrics;

impl CrawlMetrics {
    pub fn record_created() {
        counter!("webcrawl_crawls_created_total").increment(1);
    }

    pub fn record_finished(status: &'static str, duration_seconds: f64) {
        counter!("webcrawl_crawls_finished_total", "status" => status).increment(1);
        histogram!("webcrawl_crawl_duration_seconds", "status" => status)
            .record(duration_seconds);
    }

    pub fn set_processor_active(active: bool) {
        gauge!("webcrawl_processor_active").set(if active { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_uninitialized_registry_renders_empty() {
        let registry = MetricsRegistry { handle: None };
        assert!(!registry.is_enabled());
        assert_eq!(registry.render(), "");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        CrawlMetrics::record_created();
        CrawlMetrics::record_finished("done", 1.5);
        CrawlMetrics::set_processor_active(true);
        AuthMetrics::record("login");
        HttpMetrics::record("GET", "/api/crawls", 200, 0.01);
    }
}
