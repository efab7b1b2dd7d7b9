//! Component health checkers.
//!
//! - **store**: round trip to the crawl store
//! - **processor**: whether the background task is alive

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use super::check::ComponentHealth;
use crate::crawl::ProcessorLiveness;
use crate::store::CrawlStore;

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub timeout: Duration,
    /// Latency above which a healthy component is reported degraded
    pub latency_threshold_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            latency_threshold_ms: 500,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Checker Trait
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;

    /// Run [`check`](Self::check) under a timeout and record its latency.
    async fn check_with_config(&self, config: &HealthCheckConfig) -> ComponentHealth {
        let start = Instant::now();

        match tokio::time::timeout(config.timeout, self.check()).await {
            Ok(mut health) => {
                health.latency_ms = Some(start.elapsed().as_millis() as u64);
                health.check_latency_threshold(config.latency_threshold_ms);
                health
            }
            Err(_) => ComponentHealth::unhealthy(self.name())
                .with_error(format!("Health check timed out after {:?}", config.timeout))
                .with_latency(start.elapsed()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

pub struct StoreHealthChecker {
    store: Arc<dyn CrawlStore>,
}

impl StoreHealthChecker {
    pub fn new(store: Arc<dyn CrawlStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthChecker for StoreHealthChecker {
    fn name(&self) -> &str {
        "store"
    }

    async fn check(&self) -> ComponentHealth {
        match self.store.ping().await {
            Ok(()) => ComponentHealth::healthy(self.name())
                .with_metadata("backend", self.store.name()),
            Err(e) => {
                error!(error = %e, backend = self.store.name(), "Store health check failed");
                ComponentHealth::unhealthy(self.name())
                    .with_metadata("backend", self.store.name())
                    .with_error(e.user_message().to_string())
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Processor
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ProcessorHealthChecker {
    /// `None` when the processor is disabled in configuration
    liveness: Option<ProcessorLiveness>,
}

impl ProcessorHealthChecker {
    pub fn new(liveness: Option<ProcessorLiveness>) -> Self {
        Self { liveness }
    }
}

#[async_trait]
impl HealthChecker for ProcessorHealthChecker {
    fn name(&self) -> &str {
        "processor"
    }

    async fn check(&self) -> ComponentHealth {
        match &self.liveness {
            None => ComponentHealth::healthy(self.name()).with_message("Disabled"),
            Some(liveness) if liveness.is_alive() => {
                ComponentHealth::healthy(self.name()).with_message("Running")
            }
            Some(_) => ComponentHealth::unhealthy(self.name())
                .with_error("Background processor is not running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;
    use crate::store::MemoryStore;

    struct SlowChecker;

    #[async_trait]
    impl HealthChecker for SlowChecker {
        fn name(&self) -> &str {
            "slow"
        }

        async fn check(&self) -> ComponentHealth {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ComponentHealth::healthy("slow")
        }
    }

    #[tokio::test]
    async fn test_store_checker() {
        let checker = StoreHealthChecker::new(Arc::new(MemoryStore::new()));
        let health = checker.check_with_config(&HealthCheckConfig::default()).await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.metadata["backend"], "memory");
    }

    #[tokio::test]
    async fn test_timeout_is_unhealthy() {
        let config = HealthCheckConfig {
            timeout: Duration::from_millis(10),
            ..HealthCheckConfig::default()
        };
        let health = SlowChecker.check_with_config(&config).await;
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(health.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_processor_checker() {
        let disabled = ProcessorHealthChecker::new(None).check().await;
        assert_eq!(disabled.status, HealthStatus::Healthy);

        let stopped = ProcessorHealthChecker::new(Some(ProcessorLiveness::default()))
            .check()
            .await;
        assert_eq!(stopped.status, HealthStatus::Unhealthy);
    }
}
