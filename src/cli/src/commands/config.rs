//! Configuration management commands.
//!
//! Stores CLI configuration in `~/.webcrawl/config.toml`.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::credentials;
use crate::output::{self, OutputFormat};

pub const KEY_API_URL: &str = "api-url";
pub const KEY_OUTPUT: &str = "output";
const KNOWN_KEYS: &[&str] = &[KEY_API_URL, KEY_OUTPUT];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (api-url, output)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show all configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persistent CLI configuration stored on disk.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CliConfig {
    /// Load from `path`, returning defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write to `path`, creating the directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Set `key` after checking both the key and its value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate(key, value)?;
        self.values.insert(key.to_string(), value.trim().to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

fn validate(key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    match key {
        KEY_API_URL => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                anyhow::bail!("api-url must start with http:// or https://");
            }
        }
        KEY_OUTPUT => {
            OutputFormat::from_str(value, true)
                .map_err(|_| anyhow::anyhow!("output must be one of table, json, yaml"))?;
        }
        other => anyhow::bail!(
            "Unknown key '{}'; expected one of {}",
            other,
            KNOWN_KEYS.join(", ")
        ),
    }
    Ok(())
}

/// Return the path to the configuration file (`~/.webcrawl/config.toml`).
fn config_path() -> Result<PathBuf> {
    Ok(credentials::state_dir()?.join("config.toml"))
}

fn load_config() -> Result<CliConfig> {
    CliConfig::load_from(&config_path()?)
}

/// Load the `api-url` value from the config file, if set.
pub fn load_api_url() -> Option<String> {
    load_config()
        .ok()
        .and_then(|cfg| cfg.get(KEY_API_URL).map(str::to_string))
}

/// Load the default output format from the config file, if set.
pub fn load_output_format() -> Option<OutputFormat> {
    load_config()
        .ok()
        .and_then(|cfg| cfg.get(KEY_OUTPUT).and_then(|v| OutputFormat::from_str(v, true).ok()))
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            let path = config_path()?;
            let mut cfg = CliConfig::load_from(&path)?;
            cfg.set(&key, &value)?;
            cfg.save_to(&path)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, value)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = load_config()?;
            let Some(value) = cfg.get(&key) else {
                anyhow::bail!("Key '{}' not found", key);
            };
            match format {
                OutputFormat::Table => println!("{}", value),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
            }
        }

        ConfigCommands::Show => {
            let cfg = load_config()?;

            if cfg.values.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (k, v) in &cfg.values {
                        output::print_detail(k, v);
                    }
                }
                _ => output::print_item(&cfg.values, format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This will reset all CLI configuration. Use --force to confirm.");
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }

            output::print_success("Configuration reset to defaults");
        }
    }

    Ok(())
}
