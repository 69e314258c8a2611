//! Fluent builder for [`ScraperConfig`] with validation at build time.

use std::path::PathBuf;
use url::Url;

use super::types::{ConfigError, ScraperConfig};
use crate::discovery::scoring::ScoringWeights;

pub(crate) const DEFAULT_MAX_CONCURRENT_SCRAPES: usize = 1;
pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
pub(crate) const DEFAULT_MIN_CONTENT_CHARS: usize = 200;
pub(crate) const DEFAULT_REDISCOVERY_THRESHOLD: u32 = 2;
pub(crate) const DEFAULT_MAX_LLM_RETRIES: u32 = 2;
pub(crate) const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 120;
pub(crate) const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 45;
pub(crate) const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_CAPTCHA_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_LLM_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub(crate) const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Builder for [`ScraperConfig`]. All fields have working defaults except
/// credentials, which stay `None` until provided.
#[derive(Debug, Clone)]
pub struct ScraperConfigBuilder {
    max_concurrent_scrapes: usize,
    max_queue_size: usize,
    min_content_chars: usize,
    rediscovery_threshold: u32,
    max_llm_retries: u32,
    scrape_timeout_secs: u64,
    navigation_timeout_secs: u64,
    llm_timeout_secs: u64,
    captcha_timeout_secs: u64,
    llm_endpoint: String,
    llm_api_key: Option<String>,
    llm_model: String,
    captcha_endpoint: Option<String>,
    captcha_api_key: Option<String>,
    proxy: Option<String>,
    browser_executable: Option<PathBuf>,
    extension_dirs: Vec<PathBuf>,
    headless: bool,
    user_agent: Option<String>,
    data_dir: PathBuf,
    scoring: ScoringWeights,
}

impl Default for ScraperConfigBuilder {
    fn default() -> Self {
        Self {
            max_concurrent_scrapes: DEFAULT_MAX_CONCURRENT_SCRAPES,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            min_content_chars: DEFAULT_MIN_CONTENT_CHARS,
            rediscovery_threshold: DEFAULT_REDISCOVERY_THRESHOLD,
            max_llm_retries: DEFAULT_MAX_LLM_RETRIES,
            scrape_timeout_secs: DEFAULT_SCRAPE_TIMEOUT_SECS,
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            captcha_timeout_secs: DEFAULT_CAPTCHA_TIMEOUT_SECS,
            llm_endpoint: DEFAULT_LLM_ENDPOINT.to_string(),
            llm_api_key: None,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            captcha_endpoint: None,
            captcha_api_key: None,
            proxy: None,
            browser_executable: None,
            extension_dirs: Vec::new(),
            headless: true,
            user_agent: None,
            data_dir: PathBuf::from("data"),
            scoring: ScoringWeights::default(),
        }
    }
}

impl ScraperConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_concurrent_scrapes(mut self, n: usize) -> Self {
        self.max_concurrent_scrapes = n;
        self
    }

    #[must_use]
    pub fn max_queue_size(mut self, n: usize) -> Self {
        self.max_queue_size = n;
        self
    }

    #[must_use]
    pub fn min_content_chars(mut self, n: usize) -> Self {
        self.min_content_chars = n;
        self
    }

    #[must_use]
    pub fn rediscovery_threshold(mut self, n: u32) -> Self {
        self.rediscovery_threshold = n;
        self
    }

    #[must_use]
    pub fn max_llm_retries(mut self, n: u32) -> Self {
        self.max_llm_retries = n;
        self
    }

    #[must_use]
    pub fn scrape_timeout_secs(mut self, secs: u64) -> Self {
        self.scrape_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn navigation_timeout_secs(mut self, secs: u64) -> Self {
        self.navigation_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.llm_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn captcha_timeout_secs(mut self, secs: u64) -> Self {
        self.captcha_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn llm_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.llm_endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = model.into();
        self
    }

    #[must_use]
    pub fn captcha_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.captcha_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn captcha_api_key(mut self, key: impl Into<String>) -> Self {
        self.captcha_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    #[must_use]
    pub fn browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser_executable = Some(path.into());
        self
    }

    #[must_use]
    pub fn extension_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.extension_dirs.push(path.into());
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn scoring(mut self, weights: ScoringWeights) -> Self {
        self.scoring = weights;
        self
    }

    /// Validate and produce the final config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when concurrency or queue bounds are zero,
    /// an endpoint is not an absolute http(s) URL, or a timeout is zero.
    pub fn build(self) -> Result<ScraperConfig, ConfigError> {
        if self.max_concurrent_scrapes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_scrapes",
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_queue_size",
                message: "must be at least 1".to_string(),
            });
        }

        validate_endpoint("llm_endpoint", &self.llm_endpoint)?;
        if let Some(endpoint) = &self.captcha_endpoint {
            validate_endpoint("captcha_endpoint", endpoint)?;
        }
        if let Some(proxy) = &self.proxy {
            validate_endpoint("proxy", proxy)?;
        }

        for (field, secs) in [
            ("scrape_timeout_secs", self.scrape_timeout_secs),
            ("navigation_timeout_secs", self.navigation_timeout_secs),
            ("llm_timeout_secs", self.llm_timeout_secs),
            ("captcha_timeout_secs", self.captcha_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: "timeout must be non-zero".to_string(),
                });
            }
        }

        Ok(ScraperConfig {
            max_concurrent_scrapes: self.max_concurrent_scrapes,
            max_queue_size: self.max_queue_size,
            min_content_chars: self.min_content_chars,
            rediscovery_threshold: self.rediscovery_threshold,
            max_llm_retries: self.max_llm_retries,
            scrape_timeout_secs: self.scrape_timeout_secs,
            navigation_timeout_secs: self.navigation_timeout_secs,
            llm_timeout_secs: self.llm_timeout_secs,
            captcha_timeout_secs: self.captcha_timeout_secs,
            llm_endpoint: self.llm_endpoint,
            llm_api_key: self.llm_api_key,
            llm_model: self.llm_model,
            captcha_endpoint: self.captcha_endpoint,
            captcha_api_key: self.captcha_api_key,
            proxy: self.proxy,
            browser_executable: self.browser_executable,
            extension_dirs: self.extension_dirs,
            headless: self.headless,
            user_agent: self.user_agent,
            data_dir: self.data_dir,
            scoring: self.scoring,
        })
    }
}

fn validate_endpoint(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(ConfigError::Invalid {
            field,
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        }),
        Err(e) => Err(ConfigError::Invalid {
            field,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_cleanly() {
        let config = ScraperConfigBuilder::new().build().unwrap();
        assert_eq!(config.max_concurrent_scrapes(), 1);
        assert_eq!(config.max_queue_size(), 100);
        assert_eq!(config.min_content_chars(), 200);
        assert_eq!(config.rediscovery_threshold(), 2);
        assert_eq!(config.max_llm_retries(), 2);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = ScraperConfigBuilder::new()
            .max_concurrent_scrapes(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "max_concurrent_scrapes"));
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        assert!(
            ScraperConfigBuilder::new()
                .llm_endpoint("not a url")
                .build()
                .is_err()
        );
        assert!(
            ScraperConfigBuilder::new()
                .llm_endpoint("ftp://example.com")
                .build()
                .is_err()
        );
    }
}
