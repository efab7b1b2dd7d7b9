//! Probe handlers. Responses are plain JSON, outside the API envelope.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

use super::{HealthService, LivenessResponse, ReadinessResponse};

/// `/health`, `/health/live` and `/health/ready` for any state that can
/// hand out the health service.
pub fn health_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    Arc<HealthService>: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness_check))
        .route("/health/ready", get(readiness_check))
}

/// GET /health
pub async fn health_check(State(service): State<Arc<HealthService>>) -> impl IntoResponse {
    let report = service.check_health().await;
    let status = if report.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

/// GET /health/ready
pub async fn readiness_check(State(service): State<Arc<HealthService>>) -> impl IntoResponse {
    let report = service.check_health().await;
    let response = ReadinessResponse::from_health_report(&report);
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// GET /health/live
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(LivenessResponse::alive()))
}
