//! Request observation: HTTP metrics and redacted request logging.

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::debug;

use crate::telemetry::{HttpMetrics, SensitiveFieldRedactor};

/// Headers worth logging at debug level.
const LOGGED_HEADERS: &[&str] = &["authorization", "content-type", "user-agent", "x-request-id"];

/// Header values as a JSON object with credentials masked.
pub fn redacted_headers(headers: &HeaderMap) -> serde_json::Value {
    let redactor = SensitiveFieldRedactor::global();
    let map = LOGGED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((
                name.to_string(),
                serde_json::Value::String(redactor.redact(name, value)),
            ))
        })
        .collect();
    serde_json::Value::Object(map)
}

/// Record request count and latency by route template.
pub async fn observe_request(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    debug!(
        method = %method,
        path = %path,
        headers = %redacted_headers(req.headers()),
        "Request received"
    );

    let response = next.run(req).await;
    HttpMetrics::record(
        method.as_str(),
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
