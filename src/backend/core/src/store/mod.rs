//! Persistence for users, refresh tokens, crawls and broken links.
//!
//! [`CrawlStore`] is implemented by:
//! - **PgStore**: PostgreSQL through sqlx, used in deployments
//! - **MemoryStore**: process-local maps, used by tests and `memory:` URLs
//!
//! Every crawl read excludes soft-deleted rows. State-changing crawl operations
//! carry their precondition (`status = 'running'` and so on) so a concurrent
//! stop or delete makes them affect nothing instead of overwriting.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{CrawlError, Result};
use crate::models::{
    BrokenLink, CrawlJob, CrawlStats, CrawlStatus, NewBrokenLink, NewUser, RefreshToken, Role,
    User,
};
use crate::pagination::OffsetPagination;

// ═══════════════════════════════════════════════════════════════════════════════
// Query Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Which crawls a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlScope {
    All,
    Owner(i64),
}

impl CrawlScope {
    pub fn for_user(user_id: i64, role: Role) -> Self {
        if role.is_admin() {
            Self::All
        } else {
            Self::Owner(user_id)
        }
    }

    pub fn contains(&self, crawl: &CrawlJob) -> bool {
        match self {
            Self::All => true,
            Self::Owner(user_id) => crawl.is_owned_by(*user_id),
        }
    }

    pub(crate) fn owner(&self) -> Option<i64> {
        match self {
            Self::All => None,
            Self::Owner(user_id) => Some(*user_id),
        }
    }
}

/// Column a crawl listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Url,
    Status,
    Progress,
}

impl SortField {
    pub const ALL: &'static [&'static str] = &["created_at", "updated_at", "url", "status", "progress"];

    pub const fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Url => "url",
            Self::Status => "status",
            Self::Progress => "progress",
        }
    }
}

impl FromStr for SortField {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "url" => Ok(Self::Url),
            "status" => Ok(Self::Status),
            "progress" => Ok(Self::Progress),
            other => Err(CrawlError::invalid_input(format!(
                "Invalid sort field '{}': expected one of {}",
                other,
                Self::ALL.join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(CrawlError::invalid_input(format!(
                "Invalid sort order '{}': expected asc or desc",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Filters, ordering and page for a crawl listing.
#[derive(Debug, Clone)]
pub struct CrawlFilter {
    pub scope: CrawlScope,
    pub status: Option<CrawlStatus>,
    /// Case-insensitive substring of url or title
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub pagination: OffsetPagination,
}

impl CrawlFilter {
    pub fn new(scope: CrawlScope) -> Self {
        Self {
            scope,
            status: None,
            search: None,
            sort: SortField::default(),
            order: SortOrder::default(),
            pagination: OffsetPagination::default(),
        }
    }

    /// Whether a crawl passes the scope, status and search filters.
    pub fn matches(&self, crawl: &CrawlJob) -> bool {
        if crawl.deleted_at.is_some() || !self.scope.contains(crawl) {
            return false;
        }
        if self.status.is_some_and(|status| crawl.status != status) {
            return false;
        }
        match self.search.as_deref().map(str::to_lowercase) {
            Some(needle) => {
                crawl.url.to_lowercase().contains(&needle)
                    || crawl
                        .title
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Storage operations used by the services and the processor.
#[async_trait]
pub trait CrawlStore: Send + Sync {
    /// Backend name for logs and health reports.
    fn name(&self) -> &'static str;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a user. A taken email (case-insensitive) is `DuplicateRecord`.
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn update_user_name(&self, id: i64, name: &str) -> Result<Option<User>>;

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// All users, oldest first.
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Change role and/or active flag; `None` leaves a field untouched.
    async fn update_user_access(
        &self,
        id: i64,
        role: Option<Role>,
        is_active: Option<bool>,
    ) -> Result<Option<User>>;

    async fn count_users(&self) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh Tokens
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken>;

    /// A token that is neither revoked nor expired at `now`.
    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>>;

    /// Revoke one of the user's tokens. Returns false when none matched.
    async fn revoke_refresh_token(&self, user_id: i64, token_hash: &str) -> Result<bool>;

    async fn revoke_user_refresh_tokens(&self, user_id: i64) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Crawls
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a queued crawl with progress 0.
    async fn insert_crawl(&self, user_id: Option<i64>, url: &str) -> Result<CrawlJob>;

    async fn get_crawl(&self, id: i64) -> Result<Option<CrawlJob>>;

    /// Live crawl with this owner and normalized URL.
    async fn find_crawl_by_url(&self, user_id: Option<i64>, url: &str) -> Result<Option<CrawlJob>>;

    /// One page of matching crawls plus the total match count.
    async fn list_crawls(&self, filter: &CrawlFilter) -> Result<(Vec<CrawlJob>, u64)>;

    /// Mark deleted. Returns false when already gone.
    async fn soft_delete_crawl(&self, id: i64) -> Result<bool>;

    /// Reset results and put a non-running crawl back in the queue. Its broken
    /// links are removed. `None` when missing or running.
    async fn requeue_crawl(&self, id: i64) -> Result<Option<CrawlJob>>;

    /// Queued or running → error with `message`. `None` when not stoppable.
    async fn stop_crawl(&self, id: i64, message: &str) -> Result<Option<CrawlJob>>;

    /// Take the oldest queued crawl and mark it running.
    async fn claim_next_queued(&self) -> Result<Option<CrawlJob>>;

    /// Set progress on a running crawl. False when it is no longer running.
    async fn update_progress(&self, id: i64, progress: i32) -> Result<bool>;

    /// Move a running crawl to `done` (progress 100) or `error`.
    async fn finish_crawl(
        &self,
        id: i64,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<bool>;

    /// Put crawls left `running` by a previous process back in the queue.
    async fn reset_orphaned_running(&self) -> Result<u64>;

    /// Requeue every crawl in `error` within the scope.
    async fn requeue_errored(&self, scope: CrawlScope) -> Result<u64>;

    async fn crawl_stats(&self, scope: CrawlScope) -> Result<CrawlStats>;

    // ─────────────────────────────────────────────────────────────────────────
    // Broken Links
    // ─────────────────────────────────────────────────────────────────────────

    async fn list_broken_links(&self, crawl_id: i64) -> Result<Vec<BrokenLink>>;

    async fn insert_broken_link(&self, link: NewBrokenLink) -> Result<BrokenLink>;
}

/// Open the store selected by `database.url`.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn CrawlStore>> {
    if config.is_memory() {
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(config).await?;
    if config.run_migrations {
        store.migrate().await?;
    }
    Ok(Arc::new(store))
}
