//! Crate-wide error type.
//!
//! Every failure is a [`CrawlError`] carrying a stable [`ErrorCode`]. The code
//! decides the HTTP status, the log level and the `webcrawl_errors_total`
//! labels. The message shown to clients is kept apart from the internal
//! detail that only reaches the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

pub type Result<T> = std::result::Result<T, CrawlError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable, machine-readable error identifiers. The discriminant is the
/// `numeric_code` sent to clients; its thousand block is the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    CrawlNotFound = 1000,
    DuplicateCrawl = 1001,
    InvalidStateTransition = 1002,
    InvalidUrl = 1003,

    UserNotFound = 1100,
    DuplicateUser = 1101,

    DatabaseError = 2000,
    DatabaseConnectionFailed = 2001,
    DatabaseQueryFailed = 2002,
    MigrationFailed = 2003,
    RecordNotFound = 2004,
    DuplicateRecord = 2005,

    SerializationError = 2200,
    DeserializationError = 2201,

    Unauthorized = 4000,
    Forbidden = 4001,
    InvalidToken = 4002,
    TokenExpired = 4003,
    InvalidCredentials = 4004,
    AccountDisabled = 4005,

    ValidationError = 4100,
    InvalidInput = 4101,

    ConfigurationError = 5000,

    InternalError = 9000,
    UnknownError = 9099,
}

impl ErrorCode {
    pub const fn numeric_code(&self) -> u32 {
        *self as u32
    }

    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::CrawlNotFound | Self::UserNotFound | Self::RecordNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::DuplicateCrawl
            | Self::DuplicateUser
            | Self::DuplicateRecord
            | Self::InvalidStateTransition => StatusCode::CONFLICT,
            Self::InvalidUrl | Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::DatabaseConnectionFailed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label used to group errors in logs and metrics.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "crawl",
            1100..=1199 => "user",
            2000..=2099 => "database",
            2200..=2299 => "serialization",
            4000..=4099 => "authentication",
            4100..=4199 => "validation",
            5000..=5099 => "configuration",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How loudly an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller mistakes: bad input, missing or duplicate records
    Low,
    /// Rejected credentials and permissions
    Medium,
    High,
    /// The service itself is unhealthy
    Critical,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::DatabaseConnectionFailed
            | ErrorCode::MigrationFailed
            | ErrorCode::InternalError
            | ErrorCode::UnknownError => Self::Critical,
            _ => match code.numeric_code() {
                1000..=1199 | 2004 | 2005 | 4100..=4199 => Self::Low,
                4000..=4099 => Self::Medium,
                _ => Self::High,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Structured detail attached to an error response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// `crawl`, `user`, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.context.insert(key.into(), value);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty() && self.entity_id.is_none() && self.entity_type.is_none()
    }
}

#[derive(Error, Debug)]
pub struct CrawlError {
    code: ErrorCode,
    /// Safe to show to API clients
    user_message: Cow<'static, str>,
    /// Logged, never returned
    internal_message: Option<String>,
    details: ErrorDetails,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        match &self.internal_message {
            Some(internal) => write!(f, " (internal: {})", internal),
            None => Ok(()),
        }
    }
}

impl CrawlError {
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        }
    }

    /// An error whose `internal` text only goes to the logs.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal.into());
        error
    }

    pub fn internal(internal: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", internal)
    }

    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        let entity_id = entity_id.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("{} not found: {}", entity_type, entity_id),
        )
        .with_details(ErrorDetails::new().with_entity(entity_type, entity_id))
    }

    pub fn invalid_input(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message.into())
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.details = self.details.with_context(key, value);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    fn log(&self) {
        let status = self.http_status().as_u16();
        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => error!(
                error_code = %self.code,
                category = self.code.category(),
                http_status = status,
                internal_message = ?self.internal_message,
                source = ?self.source,
                "{}",
                self.user_message
            ),
            ErrorSeverity::Medium => warn!(
                error_code = %self.code,
                http_status = status,
                "{}",
                self.user_message
            ),
            ErrorSeverity::Low => debug!(
                error_code = %self.code,
                http_status = status,
                "{}",
                self.user_message
            ),
        }
    }

    fn record_metrics(&self) {
        counter!(
            "webcrawl_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category(),
            "severity" => format!("{:?}", self.severity()).to_lowercase(),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Response envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// `{"success": false, "error": {...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    pub timestamp: DateTime<Utc>,
}

impl From<&CrawlError> for ErrorResponse {
    fn from(error: &CrawlError) -> Self {
        let details = (!error.details.is_empty()).then(|| error.details.clone());
        Self {
            success: false,
            error: ErrorBody {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details,
                timestamp: Utc::now(),
            },
        }
    }
}

impl IntoResponse for CrawlError {
    fn into_response(self) -> Response {
        self.log();
        self.record_metrics();
        (self.http_status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for CrawlError {
    fn from(error: sqlx::Error) -> Self {
        let (code, message) = match &error {
            sqlx::Error::RowNotFound => (ErrorCode::RecordNotFound, "Record not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let internal = format!(
                    "unique constraint {} violated",
                    db.constraint().unwrap_or("<unnamed>")
                );
                return Self::with_internal(ErrorCode::DuplicateRecord, "Record already exists", internal)
                    .with_source(error);
            }
            sqlx::Error::Database(_) => (ErrorCode::DatabaseQueryFailed, "A database error occurred"),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => (
                ErrorCode::DatabaseConnectionFailed,
                "Database is unavailable",
            ),
            _ => (ErrorCode::DatabaseError, "A database error occurred"),
        };
        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<sqlx::migrate::MigrateError> for CrawlError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::with_internal(ErrorCode::MigrationFailed, "Database migration failed", error.to_string())
            .with_source(error)
    }
}

impl From<serde_json::Error> for CrawlError {
    fn from(error: serde_json::Error) -> Self {
        let code = match error.classify() {
            serde_json::error::Category::Io => ErrorCode::SerializationError,
            _ => ErrorCode::DeserializationError,
        };
        Self::with_internal(code, "Invalid JSON", error.to_string()).with_source(error)
    }
}

impl From<jsonwebtoken::errors::Error> for CrawlError {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let (code, message) = match error.kind() {
            ErrorKind::ExpiredSignature => (ErrorCode::TokenExpired, "Token has expired"),
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::ImmatureSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => (ErrorCode::InvalidToken, "Invalid token"),
            _ => (ErrorCode::InternalError, "Failed to process token"),
        };
        Self::with_internal(code, message, error.to_string()).with_source(error)
    }
}

impl From<argon2::password_hash::Error> for CrawlError {
    fn from(error: argon2::password_hash::Error) -> Self {
        Self::internal(format!("password hashing failed: {}", error))
    }
}

impl From<config::ConfigError> for CrawlError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(ErrorCode::ConfigurationError, "Configuration error", error.to_string())
            .with_source(error)
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(error: std::io::Error) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An I/O error occurred", error.to_string())
            .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Domain errors
// ═══════════════════════════════════════════════════════════════════════════════

impl CrawlError {
    /// Missing, deleted, or owned by someone else.
    pub fn crawl_not_found(crawl_id: i64) -> Self {
        Self::new(
            ErrorCode::CrawlNotFound,
            format!("Crawl result not found: {}", crawl_id),
        )
        .with_details(ErrorDetails::new().with_entity("crawl", crawl_id.to_string()))
    }

    pub fn duplicate_crawl(existing_id: i64, existing_status: &str) -> Self {
        Self::new(ErrorCode::DuplicateCrawl, "URL already exists in crawl queue")
            .with_context("existing_id", existing_id)
            .with_context("existing_status", existing_status)
    }

    pub fn invalid_url(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidUrl, format!("Invalid URL: {}", reason.into()))
    }

    pub fn invalid_state_transition(
        crawl_id: i64,
        from: impl fmt::Display,
        action: &str,
    ) -> Self {
        Self::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot {} crawl {} while it is {}", action, crawl_id, from),
        )
        .with_context("current_status", from.to_string())
    }

    pub fn user_not_found(user_id: i64) -> Self {
        Self::new(ErrorCode::UserNotFound, format!("User not found: {}", user_id))
            .with_details(ErrorDetails::new().with_entity("user", user_id.to_string()))
    }

    pub fn duplicate_user() -> Self {
        Self::new(ErrorCode::DuplicateUser, "User with this email already exists")
    }

    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials, "Invalid credentials")
    }

    pub fn account_disabled() -> Self {
        Self::new(ErrorCode::AccountDisabled, "Account is deactivated")
    }
}
