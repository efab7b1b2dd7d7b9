//! Health checks and the liveness/readiness probes.

mod check;
mod checker;
mod routes;

pub use check::*;
pub use checker::*;
pub use routes::*;

use std::sync::Arc;
use std::time::Instant;

/// Runs every registered checker and builds a report.
pub struct HealthService {
    config: HealthCheckConfig,
    checkers: Vec<Arc<dyn HealthChecker>>,
    started_at: Instant,
}

impl HealthService {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            checkers: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    /// Check all components concurrently, each under the configured timeout.
    pub async fn check_health(&self) -> HealthReport {
        let checks = self
            .checkers
            .iter()
            .map(|checker| checker.check_with_config(&self.config));
        let components = futures::future::join_all(checks).await;

        HealthReport::new()
            .with_uptime(self.started_at.elapsed())
            .with_components(components)
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::ProcessorLiveness;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_report_covers_all_checkers() {
        let service = HealthService::new(HealthCheckConfig::default())
            .with_checker(Arc::new(StoreHealthChecker::new(Arc::new(MemoryStore::new()))))
            .with_checker(Arc::new(ProcessorHealthChecker::new(None)));

        let report = service.check_health().await;
        assert!(report.is_healthy());
        assert_eq!(report.summary.total, 2);
        assert!(report.get_component("store").is_some());
        assert!(report.get_component("processor").is_some());
    }

    #[tokio::test]
    async fn test_dead_processor_fails_report() {
        let service = HealthService::new(HealthCheckConfig::default()).with_checker(Arc::new(
            ProcessorHealthChecker::new(Some(ProcessorLiveness::default())),
        ));

        let report = service.check_health().await;
        assert!(!report.is_operational());
    }
}
