//! Telemetry: structured logging and Prometheus metrics.

pub mod logging;
pub mod metrics;

pub use self::logging::{
    init_logging, LogFormat, LoggingConfig, RedactionConfig, SensitiveFieldRedactor,
};
pub use self::metrics::{
    init_metrics, AuthMetrics, CrawlMetrics, HttpMetrics, MetricsConfig, MetricsRegistry,
};
