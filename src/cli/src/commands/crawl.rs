//! Crawl job commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::{self, ApiClient};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CrawlCommands {
    /// Submit a URL for crawling
    Add {
        /// URL to crawl (scheme defaults to https)
        url: String,
    },

    /// List crawls
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<StatusFilter>,

        /// Match against URL or title
        #[arg(long)]
        search: Option<String>,

        /// Sort column (created_at, updated_at, url, status, progress)
        #[arg(long)]
        sort: Option<String>,

        /// Sort direction
        #[arg(long)]
        order: Option<SortOrder>,

        /// Only crawls owned by this user (admins)
        #[arg(long)]
        user_id: Option<i64>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: u64,

        #[arg(long, default_value = "0")]
        offset: u64,
    },

    /// Show a single crawl
    Show { id: i64 },

    /// List broken links found by a crawl
    Links { id: i64 },

    /// Queue a finished crawl again
    Rerun { id: i64 },

    /// Stop a queued or running crawl
    Stop { id: i64 },

    /// Delete a crawl
    Delete { id: i64 },

    /// Requeue every errored crawl you can see
    ProcessAll,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Queued,
    Running,
    Done,
    Error,
}

impl StatusFilter {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortOrder {
    Asc,
    Desc,
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct CreateCrawlRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct Crawl {
    id: i64,
    #[serde(default)]
    user_id: Option<i64>,
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    html_version: Option<String>,
    status: String,
    progress: i32,
    #[serde(default)]
    heading_counts: serde_json::Value,
    #[serde(default)]
    internal_links: i32,
    #[serde(default)]
    external_links: i32,
    #[serde(default)]
    inaccessible_links: i32,
    #[serde(default)]
    has_login_form: bool,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    /// Only present on single-crawl responses
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    broken_links: Vec<BrokenLink>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PageInfo {
    total: u64,
    limit: u64,
    offset: u64,
    page: u64,
    total_pages: u64,
    has_next: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CrawlPage {
    items: Vec<Crawl>,
    pagination: PageInfo,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeletedCrawl {
    id: i64,
    url: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeleteResponse {
    deleted_crawl: DeletedCrawl,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProcessAllResponse {
    requeued: u64,
    queued: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct BrokenLink {
    url: String,
    status_code: i32,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Tabled)]
struct CrawlRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Links (int/ext/broken)")]
    links: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&Crawl> for CrawlRow {
    fn from(c: &Crawl) -> Self {
        Self {
            id: c.id,
            url: output::truncate(&c.url, 48),
            status: c.status.clone(),
            progress: output::progress_bar(c.progress),
            links: format!(
                "{}/{}/{}",
                c.internal_links, c.external_links, c.inaccessible_links
            ),
            created_at: output::format_time(Some(c.created_at)),
        }
    }
}

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Code")]
    status_code: i32,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&BrokenLink> for LinkRow {
    fn from(l: &BrokenLink) -> Self {
        let error = match (&l.error_type, &l.error_message) {
            (Some(kind), Some(msg)) => format!("{}: {}", kind, msg),
            (Some(kind), None) => kind.clone(),
            (None, Some(msg)) => msg.clone(),
            (None, None) => "-".to_string(),
        };
        Self {
            status_code: l.status_code,
            url: output::truncate(&l.url, 60),
            error,
        }
    }
}

fn list_params(
    status: Option<StatusFilter>,
    search: Option<String>,
    sort: Option<String>,
    order: Option<SortOrder>,
    user_id: Option<i64>,
    limit: u64,
    offset: u64,
) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(status) = status {
        params.push(("status", status.as_str().to_string()));
    }
    if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
        params.push(("search", search));
    }
    if let Some(sort) = sort {
        params.push(("sort", sort));
    }
    if let Some(order) = order {
        let order = match order {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        };
        params.push(("order", order.to_string()));
    }
    if let Some(user_id) = user_id {
        params.push(("user_id", user_id.to_string()));
    }
    params.push(("limit", limit.to_string()));
    params.push(("offset", offset.to_string()));
    params
}

pub async fn execute(cmd: CrawlCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        CrawlCommands::Add { url } => {
            let crawl: Crawl = client
                .post("/api/crawls", &CreateCrawlRequest { url: &url })
                .await?;
            if format.is_table() {
                output::print_success(&format!("Queued crawl #{} for {}", crawl.id, crawl.url));
            } else {
                output::print_item(&crawl, format)?;
            }
        }

        CrawlCommands::List {
            status,
            search,
            sort,
            order,
            user_id,
            limit,
            offset,
        } => {
            let params = list_params(status, search, sort, order, user_id, limit, offset);
            let path = client::with_query("/api/crawls", &params)?;
            let page: CrawlPage = client.get(&path).await?;

            let rows: Vec<CrawlRow> = page.items.iter().map(CrawlRow::from).collect();
            output::print_list(&rows, &page, format)?;
            if format.is_table() && page.pagination.total > 0 {
                println!(
                    "Page {}/{} ({} total){}",
                    page.pagination.page,
                    page.pagination.total_pages,
                    page.pagination.total,
                    if page.pagination.has_next {
                        format!(
                            ", next: --offset {}",
                            page.pagination.offset + page.pagination.limit
                        )
                    } else {
                        String::new()
                    }
                );
            }
        }

        CrawlCommands::Show { id } => {
            let crawl: Crawl = client.get(&format!("/api/crawls/{}", id)).await?;
            if format.is_table() {
                print_crawl(&crawl);
            } else {
                output::print_item(&crawl, format)?;
            }
        }

        CrawlCommands::Links { id } => {
            let links: Vec<BrokenLink> =
                client.get(&format!("/api/crawls/{}/broken-links", id)).await?;
            let rows: Vec<LinkRow> = links.iter().map(LinkRow::from).collect();
            output::print_list(&rows, &links, format)?;
        }

        CrawlCommands::Rerun { id } => {
            let crawl: Crawl = client
                .post(&format!("/api/crawls/{}/process", id), &serde_json::json!({}))
                .await?;
            report_crawl("Requeued", &crawl, format)?;
        }

        CrawlCommands::Stop { id } => {
            let crawl: Crawl = client
                .post(&format!("/api/crawls/{}/stop", id), &serde_json::json!({}))
                .await?;
            report_crawl("Stopped", &crawl, format)?;
        }

        CrawlCommands::Delete { id } => {
            let resp: DeleteResponse = client.delete(&format!("/api/crawls/{}", id)).await?;
            if format.is_table() {
                let deleted = &resp.deleted_crawl;
                output::print_success(&format!("Deleted crawl #{} ({})", deleted.id, deleted.url));
            } else {
                output::print_item(&resp, format)?;
            }
        }

        CrawlCommands::ProcessAll => {
            let resp: ProcessAllResponse = client
                .post("/api/crawls/process-all", &serde_json::json!({}))
                .await?;
            if format.is_table() {
                output::print_success(&format!(
                    "Requeued {} errored crawl(s); {} now queued",
                    resp.requeued, resp.queued
                ));
            } else {
                output::print_item(&resp, format)?;
            }
        }
    }

    Ok(())
}

fn report_crawl(action: &str, crawl: &Crawl, format: OutputFormat) -> Result<()> {
    if format.is_table() {
        output::print_success(&format!(
            "{} crawl #{} ({})",
            action,
            crawl.id,
            output::status_badge(&crawl.status)
        ));
        Ok(())
    } else {
        output::print_item(crawl, format)
    }
}

fn print_crawl(crawl: &Crawl) {
    output::print_header(&format!("Crawl #{}", crawl.id));
    output::print_detail("URL", &crawl.url);
    output::print_detail("Status", &output::status_badge(&crawl.status));
    output::print_detail("Progress", &output::progress_bar(crawl.progress));
    if let Some(title) = &crawl.title {
        output::print_detail("Title", title);
    }
    if let Some(version) = &crawl.html_version {
        output::print_detail("HTML version", version);
    }
    output::print_detail("Internal links", &crawl.internal_links.to_string());
    output::print_detail("External links", &crawl.external_links.to_string());
    output::print_detail("Broken links", &crawl.inaccessible_links.to_string());
    output::print_detail("Login form", if crawl.has_login_form { "yes" } else { "no" });
    if let Some(owner) = crawl.user_id {
        output::print_detail("Owner", &owner.to_string());
    }
    output::print_detail("Created", &output::format_time(Some(crawl.created_at)));
    output::print_detail("Started", &output::format_time(crawl.started_at));
    output::print_detail("Finished", &output::format_time(crawl.finished_at));
    if let Some(err) = &crawl.error_message {
        output::print_detail("Error", err);
    }

    if !crawl.broken_links.is_empty() {
        output::print_header("Broken links");
        for link in &crawl.broken_links {
            output::print_detail(&link.status_code.to_string(), &link.url);
        }
    }
}
