//! webcrawl server - main entry point

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;

use webcrawl_core::{
    api::{self, AppState},
    auth::AuthService,
    config::Config,
    crawl::{CrawlProcessor, QueueNotifier},
    store,
    telemetry::{init_logging, init_metrics},
};

#[derive(Debug, Parser)]
#[command(name = "webcrawl-server", version, about = "Crawl job tracking API server")]
struct Args {
    /// Configuration file (toml, yaml or json); environment variables override it
    #[arg(short, long, env = "WEBCRAWL_CONFIG")]
    config: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if args.check_config {
        println!("Configuration OK");
        return Ok(());
    }

    init_logging(&config.logging, &config.environment)?;
    if config.metrics.enabled {
        init_metrics(&config.metrics)?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Starting webcrawl server"
    );

    let config = Arc::new(config);
    let store = store::connect(&config.database).await?;
    tracing::info!(backend = store.name(), "Store ready");

    let bootstrap = AuthService::new(store.clone(), &config.auth)?;
    bootstrap.bootstrap_admin(&config.bootstrap).await?;

    let notifier = QueueNotifier::new();
    let processor = if config.processor.enabled {
        let handle = CrawlProcessor::new(store.clone(), config.processor.clone(), notifier.clone())
            .start()
            .await?;
        Some(handle)
    } else {
        tracing::warn!("Crawl processor disabled; queued crawls will not progress");
        None
    };

    let state = AppState::new(
        config.clone(),
        store,
        notifier,
        processor.as_ref().map(|handle| handle.liveness()),
    )?;
    let app = api::build_router(state);

    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(address = %addr, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = processor {
        handle.stop().await;
    }
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
