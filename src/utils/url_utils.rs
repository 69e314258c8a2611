//! URL validation and domain normalization.
//!
//! The normalized domain is the key into the known-sites store: lowercase
//! host with a leading `www.` stripped, so `https://WWW.Example.com/a` and
//! `https://example.com/b` share one learned selector.

use anyhow::{Result, anyhow};
use url::Url;

/// Check whether a URL is something the engine will accept.
///
/// Only absolute `http`/`https` URLs with a host are scrapeable. Data URLs,
/// javascript URLs and relative paths are rejected up front so they fail at
/// validation rather than deep inside the browser adapter.
#[must_use]
pub fn is_valid_scrape_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Normalize a URL's host into the per-domain store key.
///
/// Lowercases the host and strips exactly one leading `www.` label.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed or has no host.
pub fn normalize_domain(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| anyhow!("Failed to parse URL '{url}': {e}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("URL has no host: {url}"))?;

    let lowered = host.to_ascii_lowercase();
    let normalized = lowered.strip_prefix("www.").unwrap_or(&lowered);

    Ok(normalized.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_www() {
        assert_eq!(
            normalize_domain("https://WWW.Example.COM/a/b").unwrap(),
            "example.com"
        );
        assert_eq!(
            normalize_domain("http://news.example.com/x").unwrap(),
            "news.example.com"
        );
        // Only the leading www label is stripped
        assert_eq!(
            normalize_domain("https://www.www2.example.com").unwrap(),
            "www2.example.com"
        );
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(!is_valid_scrape_url(""));
        assert!(!is_valid_scrape_url("not a url"));
        assert!(!is_valid_scrape_url("javascript:alert(1)"));
        assert!(!is_valid_scrape_url("data:text/html,hi"));
        assert!(!is_valid_scrape_url("ftp://example.com/file"));
        assert!(is_valid_scrape_url("https://example.com/article"));
    }

    #[test]
    fn normalize_fails_without_host() {
        assert!(normalize_domain("file:///tmp/x").is_err());
        assert!(normalize_domain("nonsense").is_err());
    }
}
