//! Accessor methods for [`ScraperConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::ScraperConfig;
use crate::discovery::scoring::ScoringWeights;

impl ScraperConfig {
    #[must_use]
    pub fn max_concurrent_scrapes(&self) -> usize {
        self.max_concurrent_scrapes
    }

    #[must_use]
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    #[must_use]
    pub fn min_content_chars(&self) -> usize {
        self.min_content_chars
    }

    #[must_use]
    pub fn rediscovery_threshold(&self) -> u32 {
        self.rediscovery_threshold
    }

    #[must_use]
    pub fn max_llm_retries(&self) -> u32 {
        self.max_llm_retries
    }

    #[must_use]
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    #[must_use]
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    #[must_use]
    pub fn captcha_timeout(&self) -> Duration {
        Duration::from_secs(self.captcha_timeout_secs)
    }

    #[must_use]
    pub fn llm_endpoint(&self) -> &str {
        &self.llm_endpoint
    }

    #[must_use]
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm_api_key.as_deref()
    }

    #[must_use]
    pub fn llm_model(&self) -> &str {
        &self.llm_model
    }

    #[must_use]
    pub fn captcha_endpoint(&self) -> Option<&str> {
        self.captcha_endpoint.as_deref()
    }

    #[must_use]
    pub fn captcha_api_key(&self) -> Option<&str> {
        self.captcha_api_key.as_deref()
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    #[must_use]
    pub fn browser_executable(&self) -> Option<&Path> {
        self.browser_executable.as_deref()
    }

    #[must_use]
    pub fn extension_dirs(&self) -> &[PathBuf] {
        &self.extension_dirs
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the known-sites file inside the data directory.
    #[must_use]
    pub fn known_sites_path(&self) -> PathBuf {
        self.data_dir.join("known_sites.toml")
    }

    #[must_use]
    pub fn scoring(&self) -> &ScoringWeights {
        &self.scoring
    }
}
