//! HTTP client for the webcrawl API server.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;

use crate::credentials::{CredentialStore, Credentials};

/// Success envelope returned by every `/api` route.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// A non-success response from the server.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    fn from_body(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self {
                status,
                code: Some(envelope.error.code),
                message: envelope.error.message,
            },
            Err(_) => Self {
                status,
                code: None,
                message: if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Request failed").to_string()
                } else {
                    body.trim().to_string()
                },
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{}] ({})", self.message, code, self.status),
            None => write!(f, "{} ({})", self.message, self.status),
        }
    }
}

impl std::error::Error for ApiError {}

/// Account as returned by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Issued by register, login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

// Routes that never carry a session, so a 401 from them is final.
const PUBLIC_AUTH_PATHS: &[&str] = &["/api/auth/register", "/api/auth/login", "/api/auth/refresh"];

/// HTTP client for the webcrawl API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: CredentialStore,
    credentials: RwLock<Option<Credentials>>,
}

impl ApiClient {
    /// Create a client for `base_url`, picking up any stored session.
    pub fn new(base_url: &str, store: CredentialStore) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        let credentials = store.load()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            credentials: RwLock::new(credentials),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Where the session is persisted.
    pub fn credentials_path(&self) -> &std::path::Path {
        self.store.path()
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().await.clone()
    }

    /// Persist a freshly issued token pair as the current session.
    pub async fn store_tokens(&self, tokens: &TokenPair) -> Result<Credentials> {
        let creds = Credentials::from_tokens(&self.base_url, tokens);
        self.store.save(&creds)?;
        *self.credentials.write().await = Some(creds.clone());
        Ok(creds)
    }

    /// Forget the current session. Returns whether one was stored.
    pub async fn clear_session(&self) -> Result<bool> {
        *self.credentials.write().await = None;
        self.store.clear()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<(), T>(Method::DELETE, path, None).await
    }

    /// GET a route that answers with a bare JSON document rather than the
    /// `{success, data}` envelope. A 503 body is still returned.
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = self.url(path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status, &body).into());
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let mut resp = self.execute(method.clone(), path, body).await?;

        if resp.status() == StatusCode::UNAUTHORIZED
            && !PUBLIC_AUTH_PATHS.contains(&path_only(path))
            && self.refresh_session().await?
        {
            resp = self.execute(method, path, body).await?;
        }

        Self::decode(resp).await
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response> {
        let url = self.url(path);
        let mut req = self.client.request(method.clone(), &url);
        if let Some(creds) = self.credentials.read().await.as_ref() {
            req = req.bearer_auth(&creds.access_token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req.send()
            .await
            .with_context(|| format!("{} {} failed", method, url))
    }

    /// Exchange the stored refresh token for a new pair. Returns `false`
    /// when there is no session or the server rejects the refresh token,
    /// in which case the stale session is dropped.
    async fn refresh_session(&self) -> Result<bool> {
        let refresh_token = match self.credentials.read().await.as_ref() {
            Some(creds) => creds.refresh_token.clone(),
            None => return Ok(false),
        };

        let url = self.url("/api/auth/refresh");
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        if !resp.status().is_success() {
            self.clear_session().await?;
            return Ok(false);
        }

        let tokens: TokenPair = Self::decode(resp).await?;
        self.store_tokens(&tokens).await?;
        Ok(true)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
        let status = resp.status();
        let url = resp.url().to_string();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status, &body).into());
        }

        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;

        if api_resp.success {
            api_resp
                .data
                .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
        } else {
            anyhow::bail!("API reported failure for {}", url)
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn path_only(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

/// Append URL-encoded query parameters to `path`.
pub fn with_query(path: &str, params: &[(&str, String)]) -> Result<String> {
    if params.is_empty() {
        return Ok(path.to_string());
    }
    let url = Url::parse_with_params("http://localhost/", params).context("Invalid query")?;
    Ok(format!("{}?{}", path, url.query().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_envelope() {
        let body = r#"{"success":false,"error":{"code":"RECORD_NOT_FOUND","numeric_code":2004,"message":"crawl not found: 9","timestamp":"2026-01-01T00:00:00Z"}}"#;
        let err = ApiError::from_body(StatusCode::NOT_FOUND, body);
        assert_eq!(err.code.as_deref(), Some("RECORD_NOT_FOUND"));
        assert_eq!(err.message, "crawl not found: 9");
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_api_error_from_plain_body() {
        let err = ApiError::from_body(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.code, None);
        assert_eq!(err.message, "Bad Gateway");

        let err = ApiError::from_body(StatusCode::BAD_REQUEST, "nope\n");
        assert_eq!(err.message, "nope");
    }

    #[test]
    fn test_with_query_encodes() {
        let path = with_query(
            "/api/crawls",
            &[("search", "a b&c".to_string()), ("limit", "5".to_string())],
        )
        .unwrap();
        assert_eq!(path, "/api/crawls?search=a+b%26c&limit=5");
        assert_eq!(with_query("/api/crawls", &[]).unwrap(), "/api/crawls");
    }

    #[test]
    fn test_public_paths_ignore_query() {
        assert_eq!(path_only("/api/auth/login?x=1"), "/api/auth/login");
        assert!(PUBLIC_AUTH_PATHS.contains(&path_only("/api/auth/refresh")));
        assert!(!PUBLIC_AUTH_PATHS.contains(&path_only("/api/auth/logout")));
    }

    #[test]
    fn test_token_pair_parses_server_shape() {
        let json = r#"{
            "access_token": "a",
            "refresh_token": "r",
            "token_type": "Bearer",
            "expires_in": 900,
            "expires_at": "2026-01-01T00:15:00Z",
            "user": {
                "id": 3,
                "email": "user@example.com",
                "name": "User",
                "role": "user",
                "is_active": true,
                "email_verified": false,
                "last_login": null,
                "created_at": "2026-01-01T00:00:00Z",
                "updated_at": "2026-01-01T00:00:00Z"
            }
        }"#;
        let pair: TokenPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair.user.id, 3);
        assert_eq!(pair.user.role, "user");
    }

    #[tokio::test]
    async fn test_store_and_clear_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::at(dir.path().join("credentials.toml"));
        let client = ApiClient::new("http://localhost:8080/", store.clone()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert!(client.credentials().await.is_none());

        let pair: TokenPair = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_at": "2026-01-01T00:15:00Z",
            "user": {"id": 1, "email": "e@example.com", "name": "E", "role": "admin",
                     "created_at": "2026-01-01T00:00:00Z"}
        }))
        .unwrap();
        client.store_tokens(&pair).await.unwrap();
        assert_eq!(store.load().unwrap().unwrap().role, "admin");

        assert!(client.clear_session().await.unwrap());
        assert!(client.credentials().await.is_none());
        assert!(store.load().unwrap().is_none());
    }
}
