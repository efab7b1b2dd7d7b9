//! Crawl jobs: URL normalization, the caller-facing service and the
//! background processor.

pub mod processor;
pub mod service;
pub mod url;

pub use processor::{CrawlProcessor, ProcessorHandle, ProcessorLiveness, ProcessorStats, QueueNotifier};
pub use service::{
    CrawlService, CreateCrawlRequest, DeleteCrawlResponse, ListCrawlsQuery, ProcessAllResponse,
    STOPPED_BY_USER,
};
pub use self::url::{normalize_url, MAX_URL_LEN};
