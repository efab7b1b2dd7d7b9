//! Request handlers.
//!
//! Handlers return `Result<impl IntoResponse, CrawlError>`; failures become
//! error bodies through `CrawlError`'s `IntoResponse`.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    Json,
};

use super::extract::parse_id;
use super::{ApiJson, ApiResponse, AppState};
use crate::auth::{
    AuthUser, LoginRequest, RefreshRequest, RegisterRequest, RequireAdmin, UpdateProfileRequest,
    UpdateUserAccessRequest,
};
use crate::crawl::{CreateCrawlRequest, ListCrawlsQuery};
use crate::error::CrawlError;
use crate::telemetry::MetricsRegistry;

// ═══════════════════════════════════════════════════════════════════════════════
// Auth
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    let tokens = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(tokens))))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    let tokens = state.auth.login(req).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    let tokens = state.auth.refresh(req).await?;
    Ok(Json(ApiResponse::success(tokens)))
}

pub async fn logout(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    state.auth.logout(&caller, req).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Logged out successfully"
    }))))
}

pub async fn get_profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<impl IntoResponse, CrawlError> {
    let user = state.auth.profile(&caller).await?;
    Ok(Json(ApiResponse::success(user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    let user = state.auth.update_profile(&caller, req).await?;
    Ok(Json(ApiResponse::success(user)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Crawls
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_crawls(
    State(state): State<AppState>,
    caller: AuthUser,
    Query(query): Query<ListCrawlsQuery>,
) -> Result<impl IntoResponse, CrawlError> {
    let page = state.crawls.list(&caller, query).await?;
    Ok(Json(ApiResponse::success(page)))
}

pub async fn create_crawl(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiJson(req): ApiJson<CreateCrawlRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    let crawl = state.crawls.create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(crawl))))
}

pub async fn get_crawl(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CrawlError> {
    let detail = state.crawls.get(&caller, parse_id("crawl", &id)?).await?;
    Ok(Json(ApiResponse::success(detail)))
}

pub async fn delete_crawl(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CrawlError> {
    let deleted = state.crawls.delete(&caller, parse_id("crawl", &id)?).await?;
    Ok(Json(ApiResponse::success(deleted)))
}

pub async fn get_broken_links(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CrawlError> {
    let links = state
        .crawls
        .broken_links(&caller, parse_id("crawl", &id)?)
        .await?;
    Ok(Json(ApiResponse::success(links)))
}

pub async fn process_crawl(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CrawlError> {
    let crawl = state.crawls.process(&caller, parse_id("crawl", &id)?).await?;
    Ok(Json(ApiResponse::success(crawl)))
}

pub async fn stop_crawl(
    State(state): State<AppState>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, CrawlError> {
    let crawl = state.crawls.stop(&caller, parse_id("crawl", &id)?).await?;
    Ok(Json(ApiResponse::success(crawl)))
}

pub async fn process_all(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
) -> Result<impl IntoResponse, CrawlError> {
    let result = state.crawls.process_all(&caller).await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn get_stats(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<impl IntoResponse, CrawlError> {
    let stats = state.crawls.stats(&caller).await?;
    Ok(Json(ApiResponse::success(stats)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Admin
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<impl IntoResponse, CrawlError> {
    let users = state.auth.list_users().await?;
    Ok(Json(ApiResponse::success(users)))
}

pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(caller): RequireAdmin,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserAccessRequest>,
) -> Result<impl IntoResponse, CrawlError> {
    let user = state
        .auth
        .update_user_access(&caller, parse_id("user", &id)?, req)
        .await?;
    Ok(Json(ApiResponse::success(user)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// System
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn prometheus_metrics() -> impl IntoResponse {
    let body = MetricsRegistry::global().render();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

pub async fn not_found(uri: Uri) -> CrawlError {
    CrawlError::not_found("Route", uri.path())
}
