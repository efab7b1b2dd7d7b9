//! Configuration management.
//!
//! Values come from an optional file followed by `WEBCRAWL__*` environment
//! variables, so `WEBCRAWL__DATABASE__URL` overrides `database.url`.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{CrawlError, Result};
use crate::telemetry::{LoggingConfig, MetricsConfig};

const ENV_PREFIX: &str = "WEBCRAWL";

/// Minimum accepted length for the JWT signing secret.
pub const MIN_JWT_SECRET_LEN: usize = 16;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Deployment environment name (development, production, test)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token issuing configuration
    pub auth: AuthConfig,

    /// Background processor configuration
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Optional admin account seeded at startup
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty means any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL, or `memory:` for the in-process store
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// Apply embedded migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Whether the in-process store was requested.
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory:")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    pub jwt_secret: String,

    /// `iss` claim written to and required on access tokens
    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_access_token_ttl", with = "humantime_serde")]
    pub access_token_ttl: Duration,

    #[serde(default = "default_refresh_token_ttl", with = "humantime_serde")]
    pub refresh_token_ttl: Duration,

    /// Clock skew tolerated when checking `exp`, in seconds
    #[serde(default)]
    pub leeway_secs: u64,

    /// Argon2 memory cost in KiB
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            issuer: default_issuer(),
            access_token_ttl: default_access_token_ttl(),
            refresh_token_ttl: default_refresh_token_ttl(),
            leeway_secs: 0,
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Run the background processor
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often the queue is checked when nothing wakes the processor
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Number of progress increments per crawl
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Sleep between progress increments
    #[serde(default = "default_step_delay", with = "humantime_serde")]
    pub step_delay: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: default_poll_interval(),
            steps: default_steps(),
            step_delay: default_step_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_email: None,
            admin_password: None,
            admin_name: default_admin_name(),
        }
    }
}

// Default value functions
fn default_environment() -> String { "production".to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_database_url() -> String { "memory:".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }
fn default_true() -> bool { true }
fn default_issuer() -> String { "webcrawl-api".to_string() }
fn default_access_token_ttl() -> Duration { Duration::from_secs(15 * 60) }
fn default_refresh_token_ttl() -> Duration { Duration::from_secs(7 * 24 * 60 * 60) }
fn default_argon2_memory_kib() -> u32 { 19 * 1024 }
fn default_argon2_iterations() -> u32 { 2 }
fn default_poll_interval() -> Duration { Duration::from_secs(5) }
fn default_steps() -> u32 { 10 }
fn default_step_delay() -> Duration { Duration::from_millis(500) }
fn default_admin_name() -> String { "Administrator".to_string() }

impl Config {
    /// Load configuration from the environment only.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Configuration for tests and local runs: in-memory store, fast processor.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            environment: "test".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                argon2_memory_kib: 1024,
                argon2_iterations: 1,
                ..AuthConfig::new(jwt_secret)
            },
            processor: ProcessorConfig {
                enabled: true,
                poll_interval: Duration::from_millis(50),
                steps: 4,
                step_delay: Duration::from_millis(5),
            },
            logging: LoggingConfig::default(),
            metrics: MetricsConfig {
                enabled: false,
                ..MetricsConfig::default()
            },
            bootstrap: BootstrapConfig::default(),
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().len() < MIN_JWT_SECRET_LEN {
            return Err(CrawlError::configuration(format!(
                "auth.jwt_secret must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.processor.steps == 0 {
            return Err(CrawlError::configuration("processor.steps must be greater than zero"));
        }
        if self.server.port == 0 {
            return Err(CrawlError::configuration("server.port must be non-zero"));
        }
        if self.bootstrap.admin_email.is_some() != self.bootstrap.admin_password.is_some() {
            return Err(CrawlError::configuration(
                "bootstrap.admin_email and bootstrap.admin_password must be set together",
            ));
        }
        Ok(())
    }
}
