//! Route table and the layer stack.
//!
//! # Endpoints (under `/api`)
//!
//! ## Public
//! - `POST /auth/register`, `POST /auth/login`, `POST /auth/refresh`
//!
//! ## Authenticated
//! - `POST /auth/logout`, `GET|PUT /profile`
//! - `GET|POST /crawls`, `POST /crawls/process-all` (admin)
//! - `GET|DELETE /crawls/:id`, `GET /crawls/:id/broken-links`
//! - `POST /crawls/:id/process`, `POST /crawls/:id/stop`
//! - `GET /stats`
//! - `GET /admin/users`, `PATCH /admin/users/:id` (admin)

use axum::{
    http::{HeaderName, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::{handlers, middleware, AppState};
use crate::auth::require_auth;
use crate::config::ServerConfig;
use crate::health::health_routes;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";

fn api_router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/profile", get(handlers::get_profile).put(handlers::update_profile))
        .route("/crawls", get(handlers::list_crawls).post(handlers::create_crawl))
        .route("/crawls/process-all", post(handlers::process_all))
        .route("/crawls/:id", get(handlers::get_crawl).delete(handlers::delete_crawl))
        .route("/crawls/:id/broken-links", get(handlers::get_broken_links))
        .route("/crawls/:id/process", post(handlers::process_crawl))
        .route("/crawls/:id/stop", post(handlers::stop_crawl))
        .route("/stats", get(handlers::get_stats))
        .route("/admin/users", get(handlers::list_users))
        .route("/admin/users/:id", patch(handlers::update_user))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    public.merge(protected)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    if config.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let cors = cors_layer(&state.config.server);

    Router::new()
        .nest("/api", api_router(&state))
        .merge(health_routes())
        .route("/metrics", get(handlers::prometheus_metrics))
        .fallback(handlers::not_found)
        .layer(axum_middleware::from_fn(middleware::observe_request))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<axum::body::Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri().path(),
                    request_id = %request_id,
                )
            },
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}
