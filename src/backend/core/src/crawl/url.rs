//! Normalization of submitted crawl URLs.
//!
//! Two submissions that differ only in case of the host, a default port, a
//! fragment or a trailing slash normalize to the same string, which is what the
//! duplicate check compares.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::{CrawlError, Result};

/// Longest URL accepted after normalization.
pub const MAX_URL_LEN: usize = 500;

static EXPLICIT_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("Invalid scheme regex")
});

/// Normalize and validate a user-supplied URL.
///
/// ```rust,ignore
/// assert_eq!(normalize_url(" Example.com/ ")?, "https://example.com");
/// ```
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::invalid_url("URL is required"));
    }

    let candidate = if EXPLICIT_SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut parsed = Url::parse(&candidate).map_err(|e| CrawlError::invalid_url(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(CrawlError::invalid_url("only http and https URLs are supported"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(CrawlError::invalid_url("URL host is required"));
    }

    parsed.set_fragment(None);

    let mut normalized = String::from(parsed);
    if normalized.ends_with('/') {
        normalized.pop();
    }

    if normalized.chars().count() > MAX_URL_LEN {
        return Err(CrawlError::invalid_url(format!(
            "URL must be at most {} characters",
            MAX_URL_LEN
        )));
    }

    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_adds_https_and_strips_slash() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com");
        assert_eq!(normalize_url("  example.com/  ").unwrap(), "https://example.com");
        assert_eq!(
            normalize_url("http://example.com/docs/").unwrap(),
            "http://example.com/docs"
        );
    }

    #[test]
    fn test_lowercases_host_and_drops_defaults() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/Path#section").unwrap(),
            "https://example.com/Path"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/").unwrap(),
            "http://example.com:8080"
        );
    }

    #[test]
    fn test_keeps_query() {
        assert_eq!(
            normalize_url("example.com/search?q=rust").unwrap(),
            "https://example.com/search?q=rust"
        );
    }

    #[test]
    fn test_rejects_other_schemes() {
        let err = normalize_url("ftp://example.com").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidUrl);
        assert!(normalize_url("javascript://alert(1)").is_err());
    }

    #[test]
    fn test_rejects_empty_and_hostless() {
        assert!(normalize_url("   ").is_err());
        assert!(normalize_url("https://").is_err());
    }

    #[test]
    fn test_rejects_overlong() {
        let long = format!("example.com/{}", "a".repeat(MAX_URL_LEN));
        let err = normalize_url(&long).unwrap_err();
        assert!(err.user_message().contains("at most 500"));
    }
}
