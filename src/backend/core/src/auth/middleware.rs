//! Bearer-token authentication for protected routes.
//!
//! [`require_auth`] resolves the `Authorization` header to an [`AuthUser`] and
//! stores it in the request extensions. Handlers then take [`AuthUser`] or
//! [`RequireAdmin`] as an extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::auth::service::AuthService;
use crate::error::{CrawlError, ErrorCode};
use crate::models::{Role, User};
use crate::store::CrawlScope;
use crate::telemetry::AuthMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejections produced while authenticating a request.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error(transparent)]
    Rejected(#[from] CrawlError),
}

impl AuthError {
    fn event(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InsufficientPermissions => "forbidden",
            Self::Rejected(e) if e.code() == ErrorCode::TokenExpired => "token_expired",
            Self::Rejected(_) => "token_rejected",
        }
    }
}

impl From<AuthError> for CrawlError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                CrawlError::unauthorized("Authentication credentials are required")
            }
            AuthError::InsufficientPermissions => CrawlError::forbidden("Admin access required"),
            AuthError::Rejected(e) => match e.code() {
                ErrorCode::TokenExpired
                | ErrorCode::InvalidToken
                | ErrorCode::Unauthorized => e,
                // Store failures keep their own status.
                code if code.category() == "database" => e,
                _ => CrawlError::unauthorized("Authentication failed").with_source(e),
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AuthMetrics::record(self.event());
        CrawlError::from(self).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authenticated Caller
// ═══════════════════════════════════════════════════════════════════════════════

/// The account behind an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Crawls this caller may see and act on.
    pub fn scope(&self) -> CrawlScope {
        CrawlScope::for_user(self.id, self.role)
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Guard for admin-only handlers.
pub struct RequireAdmin(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            debug!(user_id = user.id, "Admin route refused");
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(RequireAdmin(user))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Middleware
// ═══════════════════════════════════════════════════════════════════════════════

/// Extract the bearer token from the `Authorization` header.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Reject requests without a valid bearer token for an active account.
pub async fn require_auth(
    State(auth): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = extract_bearer(request.headers()).ok_or(AuthError::MissingCredentials)?;
    let user = auth.authenticate(token).await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
