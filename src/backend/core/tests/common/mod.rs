//! Shared helpers: an in-process app over the in-memory store.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use webcrawl_core::{
    api::{build_router, AppState},
    auth::AuthService,
    config::Config,
    crawl::{CrawlProcessor, ProcessorHandle, QueueNotifier},
    models::CrawlStatus,
    store::{CrawlStore, MemoryStore},
};

pub const JWT_SECRET: &str = "integration-test-secret-value";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin123";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn CrawlStore>,
    pub processor: Option<ProcessorHandle>,
}

pub fn test_config() -> Config {
    let mut config = Config::for_tests(JWT_SECRET);
    config.bootstrap.admin_email = Some(ADMIN_EMAIL.to_string());
    config.bootstrap.admin_password = Some(ADMIN_PASSWORD.to_string());
    config
}

/// Build the app. With `with_processor` the background task runs too.
pub async fn spawn_app(with_processor: bool) -> TestApp {
    let config = Arc::new(test_config());
    let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());

    AuthService::new(store.clone(), &config.auth)
        .unwrap()
        .bootstrap_admin(&config.bootstrap)
        .await
        .unwrap();

    let notifier = QueueNotifier::new();
    let processor = if with_processor {
        Some(
            CrawlProcessor::new(store.clone(), config.processor.clone(), notifier.clone())
                .start()
                .await
                .unwrap(),
        )
    } else {
        None
    };

    let state = AppState::new(
        config,
        store.clone(),
        notifier,
        processor.as_ref().map(|p| p.liveness()),
    )
    .unwrap();

    TestApp {
        router: build_router(state),
        store,
        processor,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    /// Register a user and return `(access_token, refresh_token, user_id)`.
    pub async fn register(&self, email: &str) -> (String, String, i64) {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "password": "user123",
                    "name": "Test User",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        let data = &body["data"];
        (
            data["access_token"].as_str().unwrap().to_string(),
            data["refresh_token"].as_str().unwrap().to_string(),
            data["user"]["id"].as_i64().unwrap(),
        )
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({
                    "email": ADMIN_EMAIL,
                    "password": ADMIN_PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "admin login failed: {}", body);
        body["data"]["access_token"].as_str().unwrap().to_string()
    }

    pub async fn create_crawl(&self, token: &str, url: &str) -> i64 {
        let (status, body) = self
            .post("/api/crawls", token, serde_json::json!({ "url": url }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body["data"]["id"].as_i64().unwrap()
    }

    /// Poll the store until the crawl reaches `status`.
    pub async fn wait_for_status(&self, id: i64, status: CrawlStatus) -> bool {
        for _ in 0..400 {
            if let Some(crawl) = self.store.get_crawl(id).await.unwrap() {
                if crawl.status == status {
                    return true;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}
