//! Account commands: register, login, logout and whoami.

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use serde::Serialize;

use crate::client::{ApiClient, TokenPair, UserInfo};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account and log in
    Register {
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Password (at least 6 characters)
        #[arg(short, long, env = "WEBCRAWL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in and store the session
    Login {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "WEBCRAWL_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Revoke the stored session
    Logout,

    /// Show the logged-in account
    Whoami,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

pub async fn execute(cmd: AuthCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        AuthCommands::Register {
            email,
            name,
            password,
        } => {
            let body = RegisterRequest {
                email: &email,
                password: &password,
                name: &name,
            };
            let tokens: TokenPair = client.post("/api/auth/register", &body).await?;
            client.store_tokens(&tokens).await?;
            report_session("Registered", &tokens, format)?;
        }

        AuthCommands::Login { email, password } => {
            let body = LoginRequest {
                email: &email,
                password: &password,
            };
            let tokens: TokenPair = client.post("/api/auth/login", &body).await?;
            client.store_tokens(&tokens).await?;
            report_session("Logged in", &tokens, format)?;
        }

        AuthCommands::Logout => {
            let Some(creds) = client.credentials().await else {
                output::print_info("Not logged in.");
                return Ok(());
            };

            let body = serde_json::json!({ "refresh_token": creds.refresh_token });
            let revoked: Result<serde_json::Value> = client.post("/api/auth/logout", &body).await;
            if let Err(e) = revoked {
                output::print_warning(&format!("Server did not revoke the session: {:#}", e));
            }
            client.clear_session().await?;
            output::print_success(&format!("Logged out {}", creds.email));
        }

        AuthCommands::Whoami => {
            let Some(creds) = client.credentials().await else {
                anyhow::bail!("Not logged in. Run `webcrawl auth login` first.");
            };
            let user: UserInfo = client.get("/api/profile").await?;

            if format.is_table() {
                // Reread: the profile call may have refreshed the session.
                let creds = client.credentials().await.unwrap_or(creds);
                output::print_header("Current user");
                output::print_detail("ID", &user.id.to_string());
                output::print_detail("Email", &user.email);
                output::print_detail("Name", &user.name);
                output::print_detail("Role", &user.role);
                output::print_detail("Last login", &output::format_time(user.last_login));
                output::print_detail("Server", &creds.api_url);
                output::print_detail("Session file", &client.credentials_path().display().to_string());
                let token_state = if creds.access_expired(Utc::now()) {
                    "expired (refreshed on next request)".to_string()
                } else {
                    format!("valid until {}", output::format_time(Some(creds.expires_at)))
                };
                output::print_detail("Access token", &token_state);
            } else {
                output::print_item(&user, format)?;
            }
        }
    }

    Ok(())
}

fn report_session(action: &str, tokens: &TokenPair, format: OutputFormat) -> Result<()> {
    if format.is_table() {
        output::print_success(&format!(
            "{} as {} ({})",
            action, tokens.user.email, tokens.user.role
        ));
        Ok(())
    } else {
        output::print_item(&tokens.user, format)
    }
}
