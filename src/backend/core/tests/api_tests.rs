//! End-to-end tests of the HTTP API against the in-memory store.
//!
//! Tests cover:
//! - Registration, login, refresh and logout
//! - Request authentication and the admin guard
//! - Crawl submission, listing, detail, stop, re-run and delete
//! - Statistics and admin user management
//! - Probes, metrics and error bodies

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{spawn_app, ADMIN_EMAIL};
use webcrawl_core::models::{CrawlStatus, NewBrokenLink};

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_register_returns_tokens_and_public_user() {
    let app = spawn_app(false).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "new@example.com", "password": "user123", "name": "New"})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["expires_in"], 900);
    assert_eq!(body["data"]["refresh_token"].as_str().unwrap().len(), 48);
    assert_eq!(body["data"]["user"]["email"], "new@example.com");
    assert_eq!(body["data"]["user"]["role"], "user");
    assert!(body["data"]["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_register_validation_and_duplicates() {
    let app = spawn_app(false).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "bad", "password": "123", "name": ""})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    app.register("taken@example.com").await;
    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "taken@example.com", "password": "user123", "name": "Again"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_USER");
}

#[tokio::test]
async fn test_login_failures() {
    let app = spawn_app(false).await;
    app.register("user@example.com").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "user@example.com", "password": "nope"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid credentials");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "ghost@example.com", "password": "user123"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = spawn_app(false).await;
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_rotation_and_logout() {
    let app = spawn_app(false).await;
    let (token, refresh, _) = app.register("user@example.com").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["data"]["refresh_token"].as_str().unwrap().to_string();

    // The old refresh token is spent.
    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/api/auth/logout", &token, json!({"refresh_token": "unknown"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/api/auth/logout", &token, json!({"refresh_token": rotated}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Logged out successfully");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = spawn_app(false).await;

    let (status, body) = app.request(Method::GET, "/api/crawls", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app.get("/api/profile", "garbage-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_get_and_update() {
    let app = spawn_app(false).await;
    let (token, _, id) = app.register("user@example.com").await;

    let (status, body) = app.get("/api/profile", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);

    let (status, body) = app
        .request(
            Method::PUT,
            "/api/profile",
            Some(&token),
            Some(json!({"name": "Renamed"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Renamed");

    let (status, _) = app
        .request(Method::PUT, "/api/profile", Some(&token), Some(json!({"name": " "})))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

// ============================================================================
// Crawls
// ============================================================================

#[tokio::test]
async fn test_create_crawl_and_duplicate() {
    let app = spawn_app(false).await;
    let (token, _, user_id) = app.register("user@example.com").await;

    let (status, body) = app
        .post("/api/crawls", &token, json!({"url": "Example.com/"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["url"], "https://example.com");
    assert_eq!(body["data"]["status"], "queued");
    assert_eq!(body["data"]["progress"], 0);
    assert_eq!(body["data"]["user_id"], user_id);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app
        .post("/api/crawls", &token, json!({"url": "https://example.com"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DUPLICATE_CRAWL");
    assert_eq!(body["error"]["details"]["context"]["existing_id"], id);
    assert_eq!(body["error"]["details"]["context"]["existing_status"], "queued");

    let (status, body) = app
        .post("/api/crawls", &token, json!({"url": "ftp://example.com"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_URL");
}

#[tokio::test]
async fn test_list_filters_and_pagination() {
    let app = spawn_app(false).await;
    let (token, _, _) = app.register("user@example.com").await;

    for name in ["alpha", "beta", "gamma"] {
        app.create_crawl(&token, &format!("https://{}.example", name)).await;
    }

    let (status, body) = app
        .get("/api/crawls?search=BETA", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (_, body) = app
        .get("/api/crawls?sort=url&order=asc&limit=2", &token)
        .await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["url"], "https://alpha.example");
    assert_eq!(body["data"]["pagination"]["total_pages"], 2);
    assert_eq!(body["data"]["pagination"]["has_next"], true);

    let (status, body) = app.get("/api/crawls?status=finished", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, _) = app.get("/api/crawls?sort=title", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_users_only_see_their_own_crawls() {
    let app = spawn_app(false).await;
    let (alice, _, alice_id) = app.register("alice@example.com").await;
    let (bob, _, _) = app.register("bob@example.com").await;
    let admin = app.admin_token().await;

    let id = app.create_crawl(&alice, "https://alice.example").await;
    app.create_crawl(&bob, "https://bob.example").await;

    let (status, body) = app.get(&format!("/api/crawls/{}", id), &bob).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "CRAWL_NOT_FOUND");

    let (_, body) = app.get("/api/crawls", &bob).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    let (_, body) = app.get("/api/crawls", &admin).await;
    assert_eq!(body["data"]["pagination"]["total"], 2);

    let (_, body) = app
        .get(&format!("/api/crawls?user_id={}", alice_id), &admin)
        .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);

    // Ignored for plain users.
    let (_, body) = app
        .get(&format!("/api/crawls?user_id={}", alice_id), &bob)
        .await;
    assert_eq!(body["data"]["items"][0]["url"], "https://bob.example");
}

#[tokio::test]
async fn test_crawl_detail_embeds_broken_links() {
    let app = spawn_app(false).await;
    let (token, _, _) = app.register("user@example.com").await;
    let id = app.create_crawl(&token, "https://example.com").await;

    app.store
        .insert_broken_link(NewBrokenLink {
            crawl_id: id,
            url: "https://example.com/gone".to_string(),
            status_code: 404,
            error_type: Some("http".to_string()),
            error_message: Some("Not Found".to_string()),
        })
        .await
        .unwrap();

    let (status, body) = app.get(&format!("/api/crawls/{}", id), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["broken_links"][0]["status_code"], 404);

    let (status, body) = app
        .get(&format!("/api/crawls/{}/broken-links", id), &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app.get("/api/crawls/not-a-number", &token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stop_rerun_and_delete() {
    let app = spawn_app(false).await;
    let (token, _, _) = app.register("user@example.com").await;
    let id = app.create_crawl(&token, "https://example.com").await;

    let (status, body) = app
        .post(&format!("/api/crawls/{}/stop", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "error");
    assert_eq!(body["data"]["error_message"], "Crawl stopped by user");

    let (status, _) = app
        .post(&format!("/api/crawls/{}/stop", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post(&format!("/api/crawls/{}/process", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "queued");
    assert!(body["data"]["error_message"].is_null());

    app.store.claim_next_queued().await.unwrap();
    let (status, body) = app
        .post(&format!("/api/crawls/{}/process", id), &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_STATE_TRANSITION");

    let (status, body) = app
        .request(Method::DELETE, &format!("/api/crawls/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted_crawl"]["id"], id);
    assert_eq!(body["data"]["deleted_crawl"]["url"], "https://example.com");

    let (status, _) = app.get(&format!("/api/crawls/{}", id), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_all_is_admin_only() {
    let app = spawn_app(false).await;
    let (token, _, _) = app.register("user@example.com").await;
    let admin = app.admin_token().await;

    let id = app.create_crawl(&token, "https://example.com").await;
    app.post(&format!("/api/crawls/{}/stop", id), &token, json!({}))
        .await;

    let (status, body) = app
        .post("/api/crawls/process-all", &token, json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = app
        .post("/api/crawls/process-all", &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["requeued"], 1);
    assert_eq!(body["data"]["queued"], 1);
}

#[tokio::test]
async fn test_stats_are_scoped() {
    let app = spawn_app(false).await;
    let (alice, _, _) = app.register("alice@example.com").await;
    let (bob, _, _) = app.register("bob@example.com").await;
    let admin = app.admin_token().await;

    let id = app.create_crawl(&alice, "https://a.example").await;
    app.create_crawl(&alice, "https://b.example").await;
    app.create_crawl(&bob, "https://c.example").await;
    app.post(&format!("/api/crawls/{}/stop", id), &alice, json!({}))
        .await;

    let (status, body) = app.get("/api/stats", &alice).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_crawls"], 2);
    assert_eq!(body["data"]["queued_crawls"], 1);
    assert_eq!(body["data"]["error_crawls"], 1);

    let (_, body) = app.get("/api/stats", &admin).await;
    assert_eq!(body["data"]["total_crawls"], 3);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_user_management() {
    let app = spawn_app(false).await;
    let (user_token, refresh, user_id) = app.register("user@example.com").await;
    let admin = app.admin_token().await;

    let (status, _) = app.get("/api/admin/users", &user_token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/admin/users", &admin).await;
    assert_eq!(status, StatusCode::OK);
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().any(|u| u["email"] == ADMIN_EMAIL));

    let admin_id = users
        .iter()
        .find(|u| u["email"] == ADMIN_EMAIL)
        .and_then(|u| u["id"].as_i64())
        .unwrap();
    let (status, _) = app
        .request(
            Method::PATCH,
            &format!("/api/admin/users/{}", admin_id),
            Some(&admin),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/admin/users/{}", user_id),
            Some(&admin),
            Some(json!({"is_active": false})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    // Deactivated accounts lose access immediately.
    let (status, _) = app.get("/api/profile", &user_token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refresh_token": refresh})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "user@example.com", "password": "user123"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Account is deactivated");
}

// ============================================================================
// System
// ============================================================================

#[tokio::test]
async fn test_health_probes() {
    let app = spawn_app(true).await;

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);

    let (status, body) = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn test_metrics_and_unknown_routes() {
    let app = spawn_app(false).await;

    let (status, _) = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request(Method::GET, "/api/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_processed_crawl_reaches_done() {
    let app = spawn_app(true).await;
    let (token, _, _) = app.register("user@example.com").await;
    let id = app.create_crawl(&token, "https://example.com").await;

    assert!(app.wait_for_status(id, CrawlStatus::Done).await);

    let (_, body) = app.get(&format!("/api/crawls/{}", id), &token).await;
    assert_eq!(body["data"]["status"], "done");
    assert_eq!(body["data"]["progress"], 100);
    assert!(body["data"]["finished_at"].is_string());
}
