//! In-process store backed by ordered maps behind a lock.
//!
//! Each operation takes the lock once, so claim/update/finish are atomic with
//! respect to each other just as their SQL counterparts are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{CrawlFilter, CrawlScope, CrawlStore, SortField, SortOrder};
use crate::error::{CrawlError, ErrorCode, Result};
use crate::models::{
    BrokenLink, CrawlJob, CrawlStats, CrawlStatus, NewBrokenLink, NewUser, RefreshToken, Role,
    User,
};

#[derive(Debug, Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    refresh_tokens: BTreeMap<i64, RefreshToken>,
    crawls: BTreeMap<i64, CrawlJob>,
    broken_links: BTreeMap<i64, BrokenLink>,
    next_user_id: i64,
    next_token_id: i64,
    next_crawl_id: i64,
    next_link_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Store used by tests and `memory:` database URLs. Contents live as long as
/// the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &CrawlJob, b: &CrawlJob, sort: SortField) -> Ordering {
    let primary = match sort {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Url => a.url.cmp(&b.url),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::Progress => a.progress.cmp(&b.progress),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl CrawlStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        let _guard = self.inner.read();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.inner.write();
        let email = user.email.to_lowercase();
        if inner.users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(CrawlError::with_internal(
                ErrorCode::DuplicateRecord,
                "A record with this identifier already exists",
                "users_email_key",
            ));
        }

        let now = Utc::now();
        let id = next_id(&mut inner.next_user_id);
        let created = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            is_active: true,
            email_verified: false,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(id, created.clone());
        Ok(created)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .inner
            .read()
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn update_user_name(&self, id: i64, name: &str) -> Result<Option<User>> {
        let mut inner = self.inner.write();
        Ok(inner.users.get_mut(&id).map(|user| {
            user.name = name.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.inner.write().users.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.inner.read().users.values().cloned().collect())
    }

    async fn update_user_access(
        &self,
        id: i64,
        role: Option<Role>,
        is_active: Option<bool>,
    ) -> Result<Option<User>> {
        let mut inner = self.inner.write();
        Ok(inner.users.get_mut(&id).map(|user| {
            if let Some(role) = role {
                user.role = role;
            }
            if let Some(is_active) = is_active {
                user.is_active = is_active;
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.inner.read().users.len() as u64)
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
        let mut inner = self.inner.write();
        let id = next_id(&mut inner.next_token_id);
        let token = RefreshToken {
            id,
            user_id,
            token_hash: token_hash.to_string(),
            expires_at,
            is_revoked: false,
            created_at: Utc::now(),
        };
        inner.refresh_tokens.insert(id, token.clone());
        Ok(token)
    }

    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        Ok(self
            .inner
            .read()
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.is_usable(now))
            .cloned())
    }

    async fn revoke_refresh_token(&self, user_id: i64, token_hash: &str) -> Result<bool> {
        let mut inner = self.inner.write();
        let token = inner
            .refresh_tokens
            .values_mut()
            .find(|t| t.user_id == user_id && t.token_hash == token_hash && !t.is_revoked);
        Ok(match token {
            Some(token) => {
                token.is_revoked = true;
                true
            }
            None => false,
        })
    }

    async fn revoke_user_refresh_tokens(&self, user_id: i64) -> Result<u64> {
        let mut inner = self.inner.write();
        let mut revoked = 0;
        for token in inner
            .refresh_tokens
            .values_mut()
            .filter(|t| t.user_id == user_id && !t.is_revoked)
        {
            token.is_revoked = true;
            revoked += 1;
        }
        Ok(revoked)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Crawls
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_crawl(&self, user_id: Option<i64>, url: &str) -> Result<CrawlJob> {
        let mut inner = self.inner.write();
        // Same rule as the partial unique index on (user_id, url).
        if user_id.is_some()
            && inner
                .crawls
                .values()
                .any(|c| c.deleted_at.is_none() && c.user_id == user_id && c.url == url)
        {
            return Err(CrawlError::with_internal(
                ErrorCode::DuplicateRecord,
                "A record with this identifier already exists",
                "crawl_results_owner_url_key",
            ));
        }
        let id = next_id(&mut inner.next_crawl_id);
        let crawl = CrawlJob::queued(id, user_id, url.to_string(), Utc::now());
        inner.crawls.insert(id, crawl.clone());
        Ok(crawl)
    }

    async fn get_crawl(&self, id: i64) -> Result<Option<CrawlJob>> {
        Ok(self
            .inner
            .read()
            .crawls
            .get(&id)
            .filter(|c| c.deleted_at.is_none())
            .cloned())
    }

    async fn find_crawl_by_url(&self, user_id: Option<i64>, url: &str) -> Result<Option<CrawlJob>> {
        Ok(self
            .inner
            .read()
            .crawls
            .values()
            .find(|c| c.deleted_at.is_none() && c.user_id == user_id && c.url == url)
            .cloned())
    }

    async fn list_crawls(&self, filter: &CrawlFilter) -> Result<(Vec<CrawlJob>, u64)> {
        let inner = self.inner.read();
        let mut matching: Vec<&CrawlJob> =
            inner.crawls.values().filter(|c| filter.matches(c)).collect();

        matching.sort_by(|a, b| {
            let ord = compare(a, b, filter.sort);
            match filter.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        let total = matching.len() as u64;
        let page = filter
            .pagination
            .paginate_iter(matching.into_iter().cloned());
        Ok((page, total))
    }

    async fn soft_delete_crawl(&self, id: i64) -> Result<bool> {
        let mut inner = self.inner.write();
        Ok(match inner.crawls.get_mut(&id).filter(|c| c.deleted_at.is_none()) {
            Some(crawl) => {
                let now = Utc::now();
                crawl.deleted_at = Some(now);
                crawl.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn requeue_crawl(&self, id: i64) -> Result<Option<CrawlJob>> {
        let mut inner = self.inner.write();
        let requeued = match inner
            .crawls
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none() && c.status.can_requeue())
        {
            Some(crawl) => {
                crawl.reset_for_requeue(Utc::now());
                crawl.clone()
            }
            None => return Ok(None),
        };
        inner.broken_links.retain(|_, link| link.crawl_id != id);
        Ok(Some(requeued))
    }

    async fn stop_crawl(&self, id: i64, message: &str) -> Result<Option<CrawlJob>> {
        let mut inner = self.inner.write();
        Ok(inner
            .crawls
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none() && c.status.can_stop())
            .map(|crawl| {
                let now = Utc::now();
                crawl.status = CrawlStatus::Error;
                crawl.error_message = Some(message.to_string());
                crawl.finished_at = Some(now);
                crawl.updated_at = now;
                crawl.clone()
            }))
    }

    async fn claim_next_queued(&self) -> Result<Option<CrawlJob>> {
        let mut inner = self.inner.write();
        let next = inner
            .crawls
            .values_mut()
            .filter(|c| c.deleted_at.is_none() && c.status == CrawlStatus::Queued)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(next.map(|crawl| {
            let now = Utc::now();
            crawl.status = CrawlStatus::Running;
            crawl.progress = 0;
            crawl.started_at = Some(now);
            crawl.updated_at = now;
            crawl.clone()
        }))
    }

    async fn update_progress(&self, id: i64, progress: i32) -> Result<bool> {
        let mut inner = self.inner.write();
        Ok(match inner
            .crawls
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none() && c.status == CrawlStatus::Running)
        {
            Some(crawl) => {
                crawl.progress = progress.clamp(0, 100);
                crawl.updated_at = Utc::now();
                true
            }
            None => false,
        })
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

        let mut inner = self.inner.write();
        Ok(match inner
            .crawls
            .get_mut(&id)
            .filter(|c| c.deleted_at.is_none() && c.status == CrawlStatus::Running)
        {
            Some(crawl) => {
                let now = Utc::now();
                crawl.status = status;
                if status == CrawlStatus::Done {
                    crawl.progress = 100;
                }
                crawl.error_message = error_message.map(str::to_string);
                crawl.finished_at = Some(now);
                crawl.updated_at = now;
                true
            }
            None => false,
        })
    }

    async fn reset_orphaned_running(&self) -> Result<u64> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let mut reset = 0;
        for crawl in inner
            .crawls
            .values_mut()
            .filter(|c| c.deleted_at.is_none() && c.status == CrawlStatus::Running)
        {
            crawl.status = CrawlStatus::Queued;
            crawl.progress = 0;
            crawl.started_at = None;
            crawl.updated_at = now;
            reset += 1;
        }
        Ok(reset)
    }

    async fn requeue_errored(&self, scope: CrawlScope) -> Result<u64> {
        let mut inner = self.inner.write();
        let now = Utc::now();
        let ids: Vec<i64> = inner
            .crawls
            .values_mut()
            .filter(|c| {
                c.deleted_at.is_none() && c.status == CrawlStatus::Error && scope.contains(c)
            })
            .map(|crawl| {
                crawl.reset_for_requeue(now);
                crawl.id
            })
            .collect();
        inner.broken_links.retain(|_, link| !ids.contains(&link.crawl_id));
        Ok(ids.len() as u64)
    }

    async fn crawl_stats(&self, scope: CrawlScope) -> Result<CrawlStats> {
        let inner = self.inner.read();
        let mut stats = CrawlStats::default();
        let mut visible = Vec::new();

        for crawl in inner
            .crawls
            .values()
            .filter(|c| c.deleted_at.is_none() && scope.contains(c))
        {
            visible.push(crawl.id);
            stats.total_crawls += 1;
            match crawl.status {
                CrawlStatus::Queued => stats.queued_crawls += 1,
                CrawlStatus::Running => stats.running_crawls += 1,
                CrawlStatus::Done => stats.done_crawls += 1,
                CrawlStatus::Error => stats.error_crawls += 1,
            }
        }

        stats.total_broken_links = inner
            .broken_links
            .values()
            .filter(|link| visible.contains(&link.crawl_id))
            .count() as i64;

        Ok(stats)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Broken Links
    // ─────────────────────────────────────────────────────────────────────────

    async fn list_broken_links(&self, crawl_id: i64) -> Result<Vec<BrokenLink>> {
        Ok(self
            .inner
            .read()
            .broken_links
            .values()
            .filter(|link| link.crawl_id == crawl_id)
            .cloned()
            .collect())
    }

    async fn insert_broken_link(&self, link: NewBrokenLink) -> Result<BrokenLink> {
        let mut inner = self.inner.write();
        if !inner.crawls.contains_key(&link.crawl_id) {
            return Err(CrawlError::crawl_not_found(link.crawl_id));
        }
        let id = next_id(&mut inner.next_link_id);
        let stored = BrokenLink {
            id,
            crawl_id: link.crawl_id,
            url: link.url,
            status_code: link.status_code,
            error_type: link.error_type,
            error_message: link.error_message,
            created_at: Utc::now(),
        };
        inner.broken_links.insert(id, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::OffsetPagination;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            name: "Test".to_string(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();
        let err = store.create_user(new_user("A@Example.com")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
        assert!(store.find_user_by_email("A@EXAMPLE.COM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_oldest_first_and_progress() {
        let store = MemoryStore::new();
        let first = store.insert_crawl(Some(1), "https://a.example").await.unwrap();
        let second = store.insert_crawl(Some(1), "https://b.example").await.unwrap();

        let claimed = store.claim_next_queued().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, CrawlStatus::Running);
        assert!(claimed.started_at.is_some());

        assert!(store.update_progress(first.id, 50).await.unwrap());
        assert!(!store.update_progress(second.id, 50).await.unwrap());

        assert!(store.finish_crawl(first.id, CrawlStatus::Done, None).await.unwrap());
        let done = store.get_crawl(first.id).await.unwrap().unwrap();
        assert_eq!(done.progress, 100);
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_stop_and_delete_abort_progress() {
        let store = MemoryStore::new();
        let crawl = store.insert_crawl(None, "https://a.example").await.unwrap();
        store.claim_next_queued().await.unwrap();

        let stopped = store.stop_crawl(crawl.id, "Crawl stopped by user").await.unwrap().unwrap();
        assert_eq!(stopped.status, CrawlStatus::Error);
        assert!(!store.update_progress(crawl.id, 20).await.unwrap());
        assert!(store.stop_crawl(crawl.id, "again").await.unwrap().is_none());

        let other = store.insert_crawl(None, "https://b.example").await.unwrap();
        store.claim_next_queued().await.unwrap();
        assert!(store.soft_delete_crawl(other.id).await.unwrap());
        assert!(!store.update_progress(other.id, 20).await.unwrap());
        assert!(store.get_crawl(other.id).await.unwrap().is_none());
        assert!(!store.soft_delete_crawl(other.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_requeue_clears_results_and_links() {
        let store = MemoryStore::new();
        let crawl = store.insert_crawl(Some(1), "https://a.example").await.unwrap();
        store
            .insert_broken_link(NewBrokenLink {
                crawl_id: crawl.id,
                url: "https://a.example/missing".to_string(),
                status_code: 404,
                error_type: Some("http_error".to_string()),
                error_message: None,
            })
            .await
            .unwrap();
        store.claim_next_queued().await.unwrap();
        assert!(store.requeue_crawl(crawl.id).await.unwrap().is_none());

        store.finish_crawl(crawl.id, CrawlStatus::Error, Some("boom")).await.unwrap();
        let requeued = store.requeue_crawl(crawl.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, CrawlStatus::Queued);
        assert!(requeued.error_message.is_none());
        assert!(store.list_broken_links(crawl.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_live_crawl_per_owner_and_url() {
        let store = MemoryStore::new();
        let first = store.insert_crawl(Some(1), "https://a.example").await.unwrap();

        let err = store.insert_crawl(Some(1), "https://a.example").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
        assert!(store.insert_crawl(Some(2), "https://a.example").await.is_ok());

        store.soft_delete_crawl(first.id).await.unwrap();
        assert!(store.insert_crawl(Some(1), "https://a.example").await.is_ok());
    }

    #[tokio::test]
    async fn test_list_sort_and_paginate() {
        let store = MemoryStore::new();
        for url in ["https://c.example", "https://a.example", "https://b.example"] {
            store.insert_crawl(Some(1), url).await.unwrap();
        }
        store.insert_crawl(Some(2), "https://other.example").await.unwrap();

        let mut filter = CrawlFilter::new(CrawlScope::Owner(1));
        filter.sort = SortField::Url;
        filter.order = SortOrder::Asc;
        filter.pagination = OffsetPagination::new(Some(1), Some(1));

        let (page, total) = store.list_crawls(&filter).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].url, "https://b.example");
    }

    #[tokio::test]
    async fn test_stats_respect_scope() {
        let store = MemoryStore::new();
        store.insert_crawl(Some(1), "https://a.example").await.unwrap();
        let errored = store.insert_crawl(Some(2), "https://b.example").await.unwrap();
        store.claim_next_queued().await.unwrap();
        store.claim_next_queued().await.unwrap();
        store.finish_crawl(errored.id, CrawlStatus::Error, Some("x")).await.unwrap();

        let mine = store.crawl_stats(CrawlScope::Owner(2)).await.unwrap();
        assert_eq!(mine.total_crawls, 1);
        assert_eq!(mine.error_crawls, 1);

        let all = store.crawl_stats(CrawlScope::All).await.unwrap();
        assert_eq!(all.total_crawls, 2);
        assert_eq!(all.running_crawls, 1);

        assert_eq!(store.requeue_errored(CrawlScope::Owner(1)).await.unwrap(), 0);
        assert_eq!(store.requeue_errored(CrawlScope::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refresh_tokens() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_refresh_token(1, "hash-a", now + chrono::Duration::days(1))
            .await
            .unwrap();
        store
            .insert_refresh_token(1, "hash-old", now - chrono::Duration::seconds(1))
            .await
            .unwrap();

        assert!(store.find_active_refresh_token("hash-a", now).await.unwrap().is_some());
        assert!(store.find_active_refresh_token("hash-old", now).await.unwrap().is_none());
        assert!(!store.revoke_refresh_token(2, "hash-a").await.unwrap());
        assert!(store.revoke_refresh_token(1, "hash-a").await.unwrap());
        assert!(store.find_active_refresh_token("hash-a", now).await.unwrap().is_none());
    }
}
