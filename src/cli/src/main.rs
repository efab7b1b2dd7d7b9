//! webcrawl CLI: submit crawl jobs and inspect their results.

mod client;
mod commands;
mod credentials;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reqwest::StatusCode;

use client::ApiError;
use commands::{auth, config, crawl, health, stats};
use credentials::CredentialStore;
use output::OutputFormat;

const DEFAULT_API_URL: &str = "http://localhost:8080";

/// webcrawl - crawl job tracking CLI
#[derive(Parser)]
#[command(
    name = "webcrawl",
    version,
    about = "Submit URLs for crawling and track their progress",
    propagate_version = true
)]
pub struct Cli {
    /// Output format (defaults to the `output` config value, then table)
    #[arg(short, long, global = true)]
    output: Option<OutputFormat>,

    /// API server URL
    #[arg(long, global = true, env = "WEBCRAWL_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account and session management
    #[command(subcommand)]
    Auth(auth::AuthCommands),

    /// Crawl job operations
    #[command(subcommand)]
    Crawl(crawl::CrawlCommands),

    /// Show crawl counters
    Stats,

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli
        .output
        .or_else(config::load_output_format)
        .unwrap_or_default();

    if let Err(e) = run(cli, format).await {
        output::print_error(&format!("{:#}", e));
        if let Some(api_err) = e.downcast_ref::<ApiError>() {
            if api_err.status == StatusCode::UNAUTHORIZED {
                output::print_info("Run `webcrawl auth login` to start a new session.");
            }
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli, format: OutputFormat) -> Result<()> {
    let api_url = cli.api_url;
    match cli.command {
        Commands::Auth(cmd) => auth::execute(cmd, &connect(api_url)?, format).await,
        Commands::Crawl(cmd) => crawl::execute(cmd, &connect(api_url)?, format).await,
        Commands::Stats => stats::execute(&connect(api_url)?, format).await,
        Commands::Health(args) => health::execute(args, &connect(api_url)?, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    }
}

/// Flag or env first, then the config file, then localhost.
fn connect(api_url: Option<String>) -> Result<client::ApiClient> {
    let api_url = api_url
        .or_else(config::load_api_url)
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    client::ApiClient::new(&api_url, CredentialStore::default_location()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_crawl_list_flags() {
        let cli = Cli::try_parse_from([
            "webcrawl", "--output", "json", "crawl", "list", "--status", "error", "--limit", "5",
        ])
        .unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Crawl(crawl::CrawlCommands::List { limit: 5, .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["webcrawl", "crawl", "list", "--status", "paused"]).is_err());
    }
}
