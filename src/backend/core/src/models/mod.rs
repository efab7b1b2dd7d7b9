//! Domain records shared by the store, services and API.

pub mod crawl;
pub mod user;

pub use crawl::{
    BrokenLink, CrawlDetail, CrawlJob, CrawlStats, CrawlStatus, DeletedCrawl, HeadingCounts,
    NewBrokenLink,
};
pub use user::{NewUser, RefreshToken, Role, User};
