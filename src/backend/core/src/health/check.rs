//! Health report types shared by the probes and the checkers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const SERVICE_NAME: &str = "webcrawl";

/// Ordered from best to worst, so the overall status is the maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// Serving, but slow
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self == Self::Healthy
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        *self < Self::Unhealthy
    }

    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            latency_ms: None,
            checked_at: Utc::now(),
            metadata: HashMap::new(),
            error: None,
        }
    }

    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy)
    }

    pub fn degraded(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded)
    }

    pub fn unhealthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unhealthy)
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        Self {
            latency_ms: Some(latency.as_millis() as u64),
            ..self
        }
    }

    /// Attaching an error always makes the component unhealthy.
    pub fn with_error(self, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: Some(error.into()),
            ..self
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    /// A healthy component slower than `threshold_ms` is reported degraded.
    pub fn check_latency_threshold(&mut self, threshold_ms: u64) {
        let Some(latency) = self.latency_ms else {
            return;
        };
        if self.status.is_healthy() && latency > threshold_ms {
            self.status = HealthStatus::Degraded;
            self.message = Some(format!("Slow response: {}ms > {}ms", latency, threshold_ms));
        }
    }
}

/// Component counts per status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

impl HealthSummary {
    fn count(&mut self, status: HealthStatus) {
        self.total += 1;
        let bucket = match status {
            HealthStatus::Healthy => &mut self.healthy,
            HealthStatus::Degraded => &mut self.degraded,
            HealthStatus::Unhealthy => &mut self.unhealthy,
        };
        *bucket += 1;
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<u64>,
    #[serde(default)]
    pub components: Vec<ComponentHealth>,
    pub summary: HealthSummary,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            service: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_secs: None,
            components: Vec::new(),
            summary: HealthSummary::default(),
        }
    }

    pub fn with_components(mut self, components: Vec<ComponentHealth>) -> Self {
        for component in components {
            self.summary.count(component.status);
            self.status = self.status.combine(component.status);
            self.components.push(component);
        }
        self
    }

    pub fn with_uptime(mut self, uptime: Duration) -> Self {
        self.uptime_secs = Some(uptime.as_secs());
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }

    pub fn get_component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }

    fn unready(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| !c.status.is_healthy())
            .map(|c| c.name.clone())
            .collect()
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `GET /health/live`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl LivenessResponse {
    pub fn alive() -> Self {
        Self {
            alive: true,
            service: SERVICE_NAME.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Body of `GET /health/ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unready_components: Vec<String>,
}

impl ReadinessResponse {
    /// Degraded components count as not ready.
    pub fn from_health_report(report: &HealthReport) -> Self {
        let unready_components = report.unready();
        let ready = unready_components.is_empty();
        Self {
            ready,
            service: report.service.clone(),
            timestamp: Utc::now(),
            reason: (!ready).then(|| format!("not ready: {}", unready_components.join(", "))),
            unready_components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status_wins() {
        use HealthStatus::*;
        assert_eq!(Healthy.combine(Healthy), Healthy);
        assert_eq!(Degraded.combine(Healthy), Degraded);
        assert_eq!(Degraded.combine(Unhealthy), Unhealthy);
        assert!(Degraded.is_operational());
        assert!(!Unhealthy.is_operational());
        assert_eq!(Unhealthy.to_string(), "unhealthy");
    }

    #[test]
    fn test_error_marks_unhealthy() {
        let component = ComponentHealth::healthy("store").with_error("connection refused");
        assert_eq!(component.status, HealthStatus::Unhealthy);
        assert_eq!(component.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_slow_component_degrades() {
        let mut slow = ComponentHealth::healthy("store").with_latency(Duration::from_millis(250));
        slow.check_latency_threshold(100);
        assert_eq!(slow.status, HealthStatus::Degraded);
        assert!(slow.message.is_some());

        let mut failed = ComponentHealth::unhealthy("store").with_latency(Duration::from_millis(250));
        failed.check_latency_threshold(100);
        assert_eq!(failed.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_report_and_readiness() {
        let report = HealthReport::new().with_components(vec![
            ComponentHealth::healthy("store"),
            ComponentHealth::degraded("processor"),
        ]);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.is_operational());
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.degraded, 1);

        let readiness = ReadinessResponse::from_health_report(&report);
        assert!(!readiness.ready);
        assert_eq!(readiness.unready_components, vec!["processor".to_string()]);
        assert_eq!(readiness.reason.as_deref(), Some("not ready: processor"));

        let all_good = HealthReport::new().with_components(vec![ComponentHealth::healthy("store")]);
        let readiness = ReadinessResponse::from_health_report(&all_good);
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }
}
