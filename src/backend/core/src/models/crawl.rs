//! Crawl jobs, their broken links and aggregate counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrawlError;

/// Lifecycle state of a crawl job.
///
/// ```text
/// queued ──► running ──► done
///   │           │
///   └──► error ◄┘        done | error ──► queued (re-run)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl CrawlStatus {
    pub const ALL: &'static [&'static str] = &["queued", "running", "done", "error"];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Finished jobs, successful or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Whether the job may be put back in the queue.
    pub fn can_requeue(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether a user stop applies.
    pub fn can_stop(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlStatus {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(CrawlError::invalid_input(format!(
                "Invalid status '{}': expected one of {}",
                other,
                Self::ALL.join(", ")
            ))),
        }
    }
}

/// Heading tag counts found on the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingCounts {
    #[serde(default)]
    pub h1: i32,
    #[serde(default)]
    pub h2: i32,
    #[serde(default)]
    pub h3: i32,
    #[serde(default)]
    pub h4: i32,
    #[serde(default)]
    pub h5: i32,
    #[serde(default)]
    pub h6: i32,
}

/// A submitted crawl job and whatever results it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: i64,
    pub user_id: Option<i64>,
    pub url: String,
    pub title: Option<String>,
    pub html_version: Option<String>,
    pub status: CrawlStatus,
    /// Percentage, 0..=100
    pub progress: i32,
    pub heading_counts: HeadingCounts,
    pub internal_links: i32,
    pub external_links: i32,
    pub inaccessible_links: i32,
    pub has_login_form: bool,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    /// A fresh queued job as the store would insert it.
    pub fn queued(id: i64, user_id: Option<i64>, url: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            url,
            title: None,
            html_version: None,
            status: CrawlStatus::Queued,
            progress: 0,
            heading_counts: HeadingCounts::default(),
            internal_links: 0,
            external_links: 0,
            inaccessible_links: 0,
            has_login_form: false,
            error_message: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Back to a clean queued state for a re-run.
    pub fn reset_for_requeue(&mut self, now: DateTime<Utc>) {
        let (id, user_id, url, created_at) = (self.id, self.user_id, self.url.clone(), self.created_at);
        *self = Self::queued(id, user_id, url, now);
        self.created_at = created_at;
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }
}

/// A crawl with its broken links, as returned by the detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlDetail {
    #[serde(flatten)]
    pub crawl: CrawlJob,
    pub broken_links: Vec<BrokenLink>,
}

/// Summary of a crawl removed by a delete request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedCrawl {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
}

impl From<&CrawlJob> for DeletedCrawl {
    fn from(crawl: &CrawlJob) -> Self {
        Self {
            id: crawl.id,
            url: crawl.url.clone(),
            title: crawl.title.clone(),
        }
    }
}

/// A link found on a crawled page that did not resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokenLink {
    pub id: i64,
    pub crawl_id: i64,
    pub url: String,
    pub status_code: i32,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBrokenLink {
    pub crawl_id: i64,
    pub url: String,
    pub status_code: i32,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

/// Counts over the crawls visible to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub total_crawls: i64,
    pub queued_crawls: i64,
    pub running_crawls: i64,
    pub done_crawls: i64,
    pub error_crawls: i64,
    pub total_broken_links: i64,
}
