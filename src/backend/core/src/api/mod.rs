//! HTTP API.
//!
//! JSON endpoints live under `/api` and answer with the
//! `{"success": true, "data": ...}` envelope; errors use
//! [`crate::error::ErrorResponse`]. Probes and `/metrics` are unversioned.

mod extract;
mod handlers;
pub mod middleware;
mod routes;

pub use extract::ApiJson;
pub use routes::build_router;

use axum::extract::FromRef;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::crawl::{CrawlService, ProcessorLiveness, QueueNotifier};
use crate::error::Result;
use crate::health::{HealthCheckConfig, HealthService, ProcessorHealthChecker, StoreHealthChecker};
use crate::store::CrawlStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CrawlStore>,
    pub auth: Arc<AuthService>,
    pub crawls: Arc<CrawlService>,
    pub health: Arc<HealthService>,
}

impl AppState {
    /// Wire services over `store`. `processor` is `None` when the background
    /// processor is not running in this process.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn CrawlStore>,
        notifier: QueueNotifier,
        processor: Option<ProcessorLiveness>,
    ) -> Result<Self> {
        let auth = Arc::new(AuthService::new(store.clone(), &config.auth)?);
        let crawls = Arc::new(CrawlService::new(store.clone(), notifier));
        let health = Arc::new(
            HealthService::new(HealthCheckConfig::default())
                .with_checker(Arc::new(StoreHealthChecker::new(store.clone())))
                .with_checker(Arc::new(ProcessorHealthChecker::new(processor))),
        );

        Ok(Self {
            config,
            store,
            auth,
            crawls,
            health,
        })
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<AppState> for Arc<HealthService> {
    fn from_ref(state: &AppState) -> Self {
        state.health.clone()
    }
}

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": "test data"}));
    }
}
