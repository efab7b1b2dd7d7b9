//! Crawl counters for the caller's scope.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize, Deserialize)]
struct CrawlStats {
    total_crawls: i64,
    queued_crawls: i64,
    running_crawls: i64,
    done_crawls: i64,
    error_crawls: i64,
    total_broken_links: i64,
}

pub async fn execute(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: CrawlStats = client.get("/api/stats").await?;

    if !format.is_table() {
        return output::print_item(&stats, format);
    }

    output::print_header("Crawl statistics");
    output::print_detail("Total", &stats.total_crawls.to_string());
    output::print_detail("Queued", &stats.queued_crawls.to_string());
    output::print_detail("Running", &stats.running_crawls.to_string());
    output::print_detail("Done", &stats.done_crawls.to_string());
    output::print_detail("Error", &stats.error_crawls.to_string());
    output::print_detail("Broken links", &stats.total_broken_links.to_string());
    Ok(())
}
