//! Crawl operations on behalf of an authenticated caller.
//!
//! Admins act on every crawl, users only on their own. A crawl outside the
//! caller's scope is reported as not found.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::AuthUser;
use crate::crawl::processor::QueueNotifier;
use crate::crawl::url::normalize_url;
use crate::error::{CrawlError, ErrorCode, Result};
use crate::models::{BrokenLink, CrawlDetail, CrawlJob, CrawlStats, CrawlStatus, DeletedCrawl};
use crate::pagination::{OffsetPagination, Paginated};
use crate::store::{CrawlFilter, CrawlScope, CrawlStore};
use crate::telemetry::CrawlMetrics;

/// Error message written when a user stops a crawl.
pub const STOPPED_BY_USER: &str = "Crawl stopped by user";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCrawlRequest {
    #[serde(default)]
    pub url: String,
}

/// Query string of the crawl listing. Values arrive as text so bad input gets
/// a structured 400 instead of an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListCrawlsQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    pub user_id: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn parse_number(field: &str, value: Option<&str>) -> Result<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
            CrawlError::invalid_input(format!("Invalid {} '{}': expected an integer", field, raw))
        }),
        None => Ok(None),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ListCrawlsQuery {
    /// Turn the raw query into a store filter for `caller`.
    pub fn into_filter(self, caller: &AuthUser) -> Result<CrawlFilter> {
        let mut scope = caller.scope();
        if caller.is_admin() {
            if let Some(user_id) = parse_number("user_id", self.user_id.as_deref())? {
                scope = CrawlScope::Owner(user_id);
            }
        }

        let mut filter = CrawlFilter::new(scope);
        filter.status = non_empty(self.status.as_deref())
            .map(str::parse::<CrawlStatus>)
            .transpose()?;
        filter.search = non_empty(self.search.as_deref()).map(str::to_string);
        if let Some(sort) = non_empty(self.sort.as_deref()) {
            filter.sort = sort.parse()?;
        }
        if let Some(order) = non_empty(self.order.as_deref()) {
            filter.order = order.parse()?;
        }

        let limit = parse_number("limit", self.limit.as_deref())?;
        let offset = parse_number("offset", self.offset.as_deref())?;
        filter.pagination = OffsetPagination::new(
            offset.map(|o| o.max(0) as u64),
            limit.map(|l| l.max(1) as u64),
        );

        Ok(filter)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteCrawlResponse {
    pub deleted_crawl: DeletedCrawl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessAllResponse {
    /// Errored crawls put back in the queue
    pub requeued: u64,
    /// Crawls now waiting in the queue
    pub queued: i64,
}

pub struct CrawlService {
    store: Arc<dyn CrawlStore>,
    notifier: QueueNotifier,
}

impl CrawlService {
    pub fn new(store: Arc<dyn CrawlStore>, notifier: QueueNotifier) -> Self {
        Self { store, notifier }
    }

    /// Fetch a crawl the caller may see.
    async fn visible(&self, caller: &AuthUser, id: i64) -> Result<CrawlJob> {
        self.store
            .get_crawl(id)
            .await?
            .filter(|crawl| caller.scope().contains(crawl))
            .ok_or_else(|| CrawlError::crawl_not_found(id))
    }

    #[instrument(skip(self, caller, req), fields(user_id = caller.id))]
    pub async fn create(&self, caller: &AuthUser, req: CreateCrawlRequest) -> Result<CrawlJob> {
        let url = normalize_url(&req.url)?;

        // The store enforces one live crawl per owner and URL.
        let crawl = match self.store.insert_crawl(Some(caller.id), &url).await {
            Ok(crawl) => crawl,
            Err(e) if e.code() == ErrorCode::DuplicateRecord => {
                return Err(match self.store.find_crawl_by_url(Some(caller.id), &url).await? {
                    Some(existing) => {
                        CrawlError::duplicate_crawl(existing.id, existing.status.as_str())
                    }
                    None => e,
                });
            }
            Err(e) => return Err(e),
        };
        info!(crawl_id = crawl.id, url = %crawl.url, "Crawl queued");
        CrawlMetrics::record_created();
        self.notifier.notify();
        Ok(crawl)
    }

    pub async fn list(&self, caller: &AuthUser, query: ListCrawlsQuery) -> Result<Paginated<CrawlJob>> {
        let filter = query.into_filter(caller)?;
        let (items, total) = self.store.list_crawls(&filter).await?;
        Ok(Paginated::new(items, &filter.pagination, total))
    }

    pub async fn get(&self, caller: &AuthUser, id: i64) -> Result<CrawlDetail> {
        let crawl = self.visible(caller, id).await?;
        let broken_links = self.store.list_broken_links(id).await?;
        Ok(CrawlDetail { crawl, broken_links })
    }

    pub async fn broken_links(&self, caller: &AuthUser, id: i64) -> Result<Vec<BrokenLink>> {
        self.visible(caller, id).await?;
        self.store.list_broken_links(id).await
    }

    /// Soft delete. A running crawl is abandoned by the processor on its next step.
    #[instrument(skip(self, caller), fields(user_id = caller.id))]
    pub async fn delete(&self, caller: &AuthUser, id: i64) -> Result<DeleteCrawlResponse> {
        let crawl = self.visible(caller, id).await?;
        if !self.store.soft_delete_crawl(id).await? {
            return Err(CrawlError::crawl_not_found(id));
        }

        info!(crawl_id = id, status = %crawl.status, "Crawl deleted");
        Ok(DeleteCrawlResponse {
            deleted_crawl: DeletedCrawl::from(&crawl),
        })
    }

    /// Re-run a finished, failed or queued crawl.
    #[instrument(skip(self, caller), fields(user_id = caller.id))]
    pub async fn process(&self, caller: &AuthUser, id: i64) -> Result<CrawlJob> {
        let crawl = self.visible(caller, id).await?;
        if !crawl.status.can_requeue() {
            return Err(CrawlError::invalid_state_transition(id, crawl.status, "re-run"));
        }

        let requeued = match self.store.requeue_crawl(id).await? {
            Some(requeued) => requeued,
            None => {
                // Claimed or deleted since the read above.
                let current = self.visible(caller, id).await?;
                return Err(CrawlError::invalid_state_transition(id, current.status, "re-run"));
            }
        };

        info!(crawl_id = id, "Crawl requeued");
        self.notifier.notify();
        Ok(requeued)
    }

    #[instrument(skip(self, caller), fields(user_id = caller.id))]
    pub async fn stop(&self, caller: &AuthUser, id: i64) -> Result<CrawlJob> {
        let crawl = self.visible(caller, id).await?;
        if !crawl.status.can_stop() {
            return Err(CrawlError::invalid_state_transition(id, crawl.status, "stop"));
        }

        match self.store.stop_crawl(id, STOPPED_BY_USER).await? {
            Some(stopped) => {
                info!(crawl_id = id, "Crawl stopped");
                Ok(stopped)
            }
            None => {
                let current = self.visible(caller, id).await?;
                Err(CrawlError::invalid_state_transition(id, current.status, "stop"))
            }
        }
    }

    /// Requeue every errored crawl in the caller's scope.
    #[instrument(skip(self, caller), fields(user_id = caller.id))]
    pub async fn process_all(&self, caller: &AuthUser) -> Result<ProcessAllResponse> {
        let scope = caller.scope();
        let requeued = self.store.requeue_errored(scope).await?;
        let queued = self.store.crawl_stats(scope).await?.queued_crawls;

        info!(requeued, queued, "Errored crawls requeued");
        self.notifier.notify();
        Ok(ProcessAllResponse { requeued, queued })
    }

    pub async fn stats(&self, caller: &AuthUser) -> Result<CrawlStats> {
        self.store.crawl_stats(caller.scope()).await
    }
}
