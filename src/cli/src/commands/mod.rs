pub mod auth;
pub mod config;
pub mod crawl;
pub mod health;
pub mod stats;
