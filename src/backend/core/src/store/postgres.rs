//! PostgreSQL store.
//!
//! Runtime-checked queries keep the crate buildable without a live database.
//! Listing filters go through `QueryBuilder` so user input is always bound,
//! never interpolated; only whitelisted sort columns are written into SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, instrument};

use super::{CrawlFilter, CrawlScope, CrawlStore};
use crate::config::DatabaseConfig;
use crate::error::{CrawlError, Result};
use crate::models::{
    BrokenLink, CrawlJob, CrawlStats, CrawlStatus, HeadingCounts, NewBrokenLink, NewUser,
    RefreshToken, Role, User,
};

const USER_COLUMNS: &str = "id, email, password_hash, name, role, is_active, email_verified, \
     last_login, created_at, updated_at";

const CRAWL_COLUMNS: &str = "id, user_id, url, title, html_version, status, progress, \
     heading_counts, internal_links, external_links, inaccessible_links, has_login_form, \
     error_message, started_at, finished_at, created_at, updated_at, deleted_at";

const TOKEN_COLUMNS: &str = "id, user_id, token_hash, expires_at, is_revoked, created_at";

const LINK_COLUMNS: &str =
    "id, crawl_id, url, status_code, error_type, error_message, created_at";

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    is_active: bool,
    email_verified: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = CrawlError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse()?,
            is_active: row.is_active,
            email_verified: row.email_verified,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CrawlRow {
    id: i64,
    user_id: Option<i64>,
    url: String,
    title: Option<String>,
    html_version: Option<String>,
    status: String,
    progress: i32,
    heading_counts: Json<HeadingCounts>,
    internal_links: i32,
    external_links: i32,
    inaccessible_links: i32,
    has_login_form: bool,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<CrawlRow> for CrawlJob {
    type Error = CrawlError;

    fn try_from(row: CrawlRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            url: row.url,
            title: row.title,
            html_version: row.html_version,
            status: row.status.parse()?,
            progress: row.progress,
            heading_counts: row.heading_counts.0,
            internal_links: row.internal_links,
            external_links: row.external_links,
            inaccessible_links: row.inaccessible_links,
            has_login_form: row.has_login_form,
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    id: i64,
    user_id: i64,
    token_hash: String,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    created_at: DateTime<Utc>,
}

impl From<TokenRow> for RefreshToken {
    fn from(row: TokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: i64,
    crawl_id: i64,
    url: String,
    status_code: i32,
    error_type: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<LinkRow> for BrokenLink {
    fn from(row: LinkRow) -> Self {
        Self {
            id: row.id,
            crawl_id: row.crawl_id,
            url: row.url,
            status_code: row.status_code,
            error_type: row.error_type,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    total_crawls: i64,
    queued_crawls: i64,
    running_crawls: i64,
    done_crawls: i64,
    error_crawls: i64,
}

fn crawl_opt(row: Option<CrawlRow>) -> Result<Option<CrawlJob>> {
    row.map(CrawlJob::try_from).transpose()
}

fn user_opt(row: Option<UserRow>) -> Result<Option<User>> {
    row.map(User::try_from).transpose()
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_crawl_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &CrawlFilter) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(owner) = filter.scope.owner() {
        qb.push(" AND user_id = ").push_bind(owner);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        qb.push(" AND (url ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR title ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL-backed [`CrawlStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CrawlStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        user_opt(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        user_opt(row)
    }

    async fn update_user_name(&self, id: i64, name: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        user_opt(row)
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users ORDER BY id ASC", USER_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn update_user_access(
        &self,
        id: i64,
        role: Option<Role>,
        is_active: Option<bool>,
    ) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET role = COALESCE($2, role), is_active = COALESCE($3, is_active), \
             updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role.map(|r| r.as_str()))
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?;
        user_opt(row)
    }

    async fn count_users(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Refresh Tokens
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        let row: TokenRow = sqlx::query_as(&format!(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3) \
             RETURNING {}",
            TOKEN_COLUMNS
        ))
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let row: Option<TokenRow> = sqlx::query_as(&format!(
            "SELECT {} FROM refresh_tokens \
             WHERE token_hash = $1 AND is_revoked = FALSE AND expires_at > $2",
            TOKEN_COLUMNS
        ))
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshToken::from))
    }

    async fn revoke_refresh_token(&self, user_id: i64, token_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE \
             WHERE user_id = $1 AND token_hash = $2 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE WHERE user_id = $1 AND is_revoked = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Crawls
    // ─────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    async fn insert_crawl(&self, user_id: Option<i64>, url: &str) -> Result<CrawlJob> {
        let row: CrawlRow = sqlx::query_as(&format!(
            "INSERT INTO crawl_results (user_id, url) VALUES ($1, $2) RETURNING {}",
            CRAWL_COLUMNS
        ))
        .bind(user_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_crawl(&self, id: i64) -> Result<Option<CrawlJob>> {
        let row: Option<CrawlRow> = sqlx::query_as(&format!(
            "SELECT {} FROM crawl_results WHERE id = $1 AND deleted_at IS NULL",
            CRAWL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        crawl_opt(row)
    }

    async fn find_crawl_by_url(&self, user_id: Option<i64>, url: &str) -> Result<Option<CrawlJob>> {
        let row: Option<CrawlRow> = sqlx::query_as(&format!(
            "SELECT {} FROM crawl_results \
             WHERE user_id IS NOT DISTINCT FROM $1 AND url = $2 AND deleted_at IS NULL \
             ORDER BY id ASC LIMIT 1",
            CRAWL_COLUMNS
        ))
        .bind(user_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        crawl_opt(row)
    }

    #[instrument(skip(self, filter), fields(scope = ?filter.scope))]
    async fn list_crawls(&self, filter: &CrawlFilter) -> Result<(Vec<CrawlJob>, u64)> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM crawl_results");
        push_crawl_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut page_query =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM crawl_results", CRAWL_COLUMNS));
        push_crawl_filters(&mut page_query, filter);
        page_query
            .push(format!(
                " ORDER BY {col} {dir}, id {dir}",
                col = filter.sort.column(),
                dir = filter.order.keyword()
            ))
            .push(" LIMIT ")
            .push_bind(filter.pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.pagination.offset as i64);

        let rows: Vec<CrawlRow> = page_query.build_query_as().fetch_all(&self.pool).await?;
        let crawls = rows
            .into_iter()
            .map(CrawlJob::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((crawls, total as u64))
    }

    async fn soft_delete_crawl(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE crawl_results SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn requeue_crawl(&self, id: i64) -> Result<Option<CrawlJob>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<CrawlRow> = sqlx::query_as(&format!(
            "UPDATE crawl_results SET status = 'queued', progress = 0, title = NULL, \
             html_version = NULL, heading_counts = '{{}}'::jsonb, internal_links = 0, \
             external_links = 0, inaccessible_links = 0, has_login_form = FALSE, \
             error_message = NULL, started_at = NULL, finished_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status <> 'running' AND deleted_at IS NULL RETURNING {}",
            CRAWL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if row.is_some() {
            sqlx::query("DELETE FROM broken_links WHERE crawl_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        crawl_opt(row)
    }

    async fn stop_crawl(&self, id: i64, message: &str) -> Result<Option<CrawlJob>> {
        let row: Option<CrawlRow> = sqlx::query_as(&format!(
            "UPDATE crawl_results SET status = 'error', error_message = $2, finished_at = NOW(), \
             updated_at = NOW() \
             WHERE id = $1 AND status IN ('queued', 'running') AND deleted_at IS NULL \
             RETURNING {}",
            CRAWL_COLUMNS
        ))
        .bind(id)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;
        crawl_opt(row)
    }

    async fn claim_next_queued(&self) -> Result<Option<CrawlJob>> {
        let row: Option<CrawlRow> = sqlx::query_as(&format!(
            "UPDATE crawl_results SET status = 'running', progress = 0, started_at = NOW(), \
             updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM crawl_results \
                 WHERE status = 'queued' AND deleted_at IS NULL \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 FOR UPDATE SKIP LOCKED \
             ) RETURNING {}",
            CRAWL_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        crawl_opt(row)
    }

    async fn update_progress(&self, id: i64, progress: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE crawl_results SET progress = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'running' AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(progress.clamp(0, 100))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn finish_crawl(
        &self,
        id: i64,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        if !status.is_terminal() {
            return Err(CrawlError::internal(format!(
                "finish_crawl called with non-terminal status {}",
                status
            )));
        }

        let result = sqlx::query(
            "UPDATE crawl_results SET status = $2, \
             progress = CASE WHEN $3 THEN 100 ELSE progress END, \
             error_message = $4, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'running' AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(status == CrawlStatus::Done)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_orphaned_running(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE crawl_results SET status = 'queued', progress = 0, started_at = NULL, \
             updated_at = NOW() WHERE status = 'running' AND deleted_at IS NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn requeue_errored(&self, scope: CrawlScope) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<i64> = sqlx::query_scalar(
            "UPDATE crawl_results SET status = 'queued', progress = 0, title = NULL, \
             html_version = NULL, heading_counts = '{}'::jsonb, internal_links = 0, \
             external_links = 0, inaccessible_links = 0, has_login_form = FALSE, \
             error_message = NULL, started_at = NULL, finished_at = NULL, updated_at = NOW() \
             WHERE status = 'error' AND deleted_at IS NULL \
             AND ($1::BIGINT IS NULL OR user_id = $1) RETURNING id",
        )
        .bind(scope.owner())
        .fetch_all(&mut *tx)
        .await?;

        if !ids.is_empty() {
            sqlx::query("DELETE FROM broken_links WHERE crawl_id = ANY($1)")
                .bind(&ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    async fn crawl_stats(&self, scope: CrawlScope) -> Result<CrawlStats> {
        let row: StatsRow = sqlx::query_as(
            "SELECT COUNT(*) AS total_crawls, \
             COUNT(*) FILTER (WHERE status = 'queued') AS queued_crawls, \
             COUNT(*) FILTER (WHERE status = 'running') AS running_crawls, \
             COUNT(*) FILTER (WHERE status = 'done') AS done_crawls, \
             COUNT(*) FILTER (WHERE status = 'error') AS error_crawls \
             FROM crawl_results \
             WHERE deleted_at IS NULL AND ($1::BIGINT IS NULL OR user_id = $1)",
        )
        .bind(scope.owner())
        .fetch_one(&self.pool)
        .await?;

        let total_broken_links: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM broken_links b \
             JOIN crawl_results c ON c.id = b.crawl_id \
             WHERE c.deleted_at IS NULL AND ($1::BIGINT IS NULL OR c.user_id = $1)",
        )
        .bind(scope.owner())
        .fetch_one(&self.pool)
        .await?;

        Ok(CrawlStats {
            total_crawls: row.total_crawls,
            queued_crawls: row.queued_crawls,
            running_crawls: row.running_crawls,
            done_crawls: row.done_crawls,
            error_crawls: row.error_crawls,
            total_broken_links,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Broken Links
    // ─────────────────────────────────────────────────────────────────────────

    async fn list_broken_links(&self, crawl_id: i64) -> Result<Vec<BrokenLink>> {
        let rows: Vec<LinkRow> = sqlx::query_as(&format!(
            "SELECT {} FROM broken_links WHERE crawl_id = $1 ORDER BY id ASC",
            LINK_COLUMNS
        ))
        .bind(crawl_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BrokenLink::from).collect())
    }

    async fn insert_broken_link(&self, link: NewBrokenLink) -> Result<BrokenLink> {
        let row: LinkRow = sqlx::query_as(&format!(
            "INSERT INTO broken_links (crawl_id, url, status_code, error_type, error_message) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            LINK_COLUMNS
        ))
        .bind(link.crawl_id)
        .bind(&link.url)
        .bind(link.status_code)
        .bind(&link.error_type)
        .bind(&link.error_message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}
