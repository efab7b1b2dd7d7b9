#![allow(clippy::result_large_err)]
//! # webcrawl core
//!
//! Crawl-job tracking API: users submit URLs, a background processor walks
//! each queued job through simulated progress, and the HTTP API lists, filters
//! and manages jobs with role-based access.
//!
//! ## Architecture
//!
//! - **Store**: `CrawlStore` trait over PostgreSQL (sqlx) or an in-memory backend
//! - **Auth**: argon2 passwords, HS256 access tokens, rotating refresh tokens
//! - **Crawl**: URL normalization, scoped crawl operations, the background processor
//! - **API**: axum router with the JSON envelope, probes and Prometheus metrics
//! - **Telemetry**: structured logging with redaction, metrics recorder

pub mod api;
pub mod auth;
pub mod config;
pub mod crawl;
pub mod error;
pub mod health;
pub mod models;
pub mod pagination;
pub mod store;
pub mod telemetry;
pub mod validation;

pub use error::{CrawlError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, AppState};
    pub use crate::auth::{AuthService, AuthUser};
    pub use crate::config::Config;
    pub use crate::crawl::{CrawlProcessor, CrawlService, QueueNotifier};
    pub use crate::error::{CrawlError, ErrorCode, Result};
    pub use crate::models::{CrawlJob, CrawlStatus, Role, User};
    pub use crate::store::{CrawlStore, MemoryStore, PgStore};
}
