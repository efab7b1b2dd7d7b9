//! Log subscriber setup and redaction of secrets before they reach the logs.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Base filter directive, `info` unless `RUST_LOG` says otherwise
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Extra `target=level` directives, e.g. `sqlx = "warn"`
    #[serde(default = "default_module_levels")]
    pub module_levels: HashMap<String, String>,

    #[serde(default)]
    pub include_location: bool,

    /// Log span timings when spans close
    #[serde(default)]
    pub span_close_events: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: default_module_levels(),
            include_location: false,
            span_close_events: false,
            redaction: RedactionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Keys whose values are always masked (case-insensitive substring match)
    #[serde(default = "default_sensitive_fields")]
    pub fields: Vec<String>,

    /// Regexes masked wherever they appear inside a value
    #[serde(default = "default_value_patterns")]
    pub value_patterns: Vec<String>,

    #[serde(default = "default_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fields: default_sensitive_fields(),
            value_patterns: default_value_patterns(),
            replacement: default_replacement(),
        }
    }
}

/// Masks passwords, tokens and credentials in values headed for the logs.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    enabled: bool,
    fields: Vec<String>,
    patterns: Vec<Regex>,
    replacement: String,
}

impl SensitiveFieldRedactor {
    /// Patterns that fail to compile are skipped with a warning.
    pub fn new(config: &RedactionConfig) -> Self {
        let patterns = config
            .value_patterns
            .iter()
            .filter_map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| tracing::warn!(pattern, error = %e, "Skipping redaction pattern"))
                    .ok()
            })
            .collect();

        Self {
            enabled: config.enabled,
            fields: config.fields.iter().map(|f| f.to_lowercase()).collect(),
            patterns,
            replacement: config.replacement.clone(),
        }
    }

    /// Installed by [`init_logging`]; falls back to the default rules.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| Self::new(&RedactionConfig::default()))
    }

    pub fn should_redact_field(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.enabled && self.fields.iter().any(|field| name.contains(field.as_str()))
    }

    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        let mut out = value.to_string();
        for pattern in &self.patterns {
            if pattern.is_match(&out) {
                out = pattern.replace_all(&out, self.replacement.as_str()).into_owned();
            }
        }
        out
    }

    pub fn redact(&self, name: &str, value: &str) -> String {
        if self.should_redact_field(name) {
            self.replacement.clone()
        } else {
            self.redact_value(value)
        }
    }

    /// Mask sensitive members of a JSON document in place.
    pub fn redact_json(&self, value: &mut Value) {
        if !self.enabled {
            return;
        }
        match value {
            Value::Object(members) => {
                for (key, member) in members.iter_mut() {
                    if self.should_redact_field(key) {
                        *member = Value::String(self.replacement.clone());
                    } else {
                        self.redact_json(member);
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.redact_json(item)),
            Value::String(text) => *text = self.redact_value(text),
            _ => {}
        }
    }
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_module_levels() -> HashMap<String, String> {
    [("sqlx", "warn"), ("tower_http", "info")]
        .into_iter()
        .map(|(target, level)| (target.to_string(), level.to_string()))
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_sensitive_fields() -> Vec<String> {
    ["password", "passwd", "secret", "token", "authorization", "cookie"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_value_patterns() -> Vec<String> {
    vec![
        // JWT
        r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+".to_string(),
        r"(?i)bearer\s+[a-z0-9._~+/=-]+".to_string(),
    ]
}

fn default_replacement() -> String {
    "[REDACTED]".to_string()
}

/// Install the global subscriber and redactor.
///
/// JSON output switches to pretty output when `environment` is
/// `development`. Fails on a bad directive or when a subscriber is already
/// installed.
pub fn init_logging(config: &LoggingConfig, environment: &str) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let filter = config
        .module_levels
        .iter()
        .try_fold(EnvFilter::try_new(&config.level)?, |filter, (target, level)| {
            Ok::<_, anyhow::Error>(filter.add_directive(format!("{}={}", target, level).parse()?))
        })?;

    let format = match (config.format, environment) {
        (LogFormat::Json, "development") => LogFormat::Pretty,
        (format, _) => format,
    };

    let base = fmt::layer()
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(if config.span_close_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    let layer = match format {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    Ok(())
}
