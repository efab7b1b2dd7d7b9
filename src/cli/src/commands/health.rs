//! Health check command.
//!
//! Queries the `/health` endpoint and displays component status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include per-component checks
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;
    let status = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    match format {
        OutputFormat::Table => {
            output::print_header("System Health");
            output::print_detail("Status", &output::status_badge(&status));
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }
            if let Some(uptime) = health.get("uptime_secs").and_then(|v| v.as_u64()) {
                output::print_detail("Uptime", &format!("{}s", uptime));
            }

            if args.detailed {
                if let Some(components) = health.get("components").and_then(|v| v.as_array()) {
                    output::print_header("Components");
                    for comp in components {
                        let name = comp.get("name").and_then(|v| v.as_str()).unwrap_or("?");
                        let comp_status =
                            comp.get("status").and_then(|v| v.as_str()).unwrap_or("?");
                        let mut line = output::status_badge(comp_status);
                        if let Some(ms) = comp.get("latency_ms").and_then(|v| v.as_u64()) {
                            line.push_str(&format!(" ({}ms)", ms));
                        }
                        if let Some(msg) = comp
                            .get("error")
                            .or_else(|| comp.get("message"))
                            .and_then(|v| v.as_str())
                        {
                            line.push_str(&format!(" - {}", msg));
                        }
                        output::print_detail(name, &line);
                    }
                }
            }

            println!();
            if status == "healthy" {
                output::print_success("All systems operational");
            } else {
                output::print_warning(&format!("System status: {}", status));
            }
        }
        _ => output::print_item(&health, format)?,
    }

    if status == "unhealthy" {
        anyhow::bail!("Server reported unhealthy");
    }
    Ok(())
}
