//! Core configuration types for the scraping engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::discovery::scoring::ScoringWeights;

/// Error raised while building or loading a configuration.
///
/// Surfaces to callers as a `configuration` failure; the engine never
/// starts with a partially validated config.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
}

/// Validated configuration for a [`ScrapeEngine`](crate::engine::ScrapeEngine).
///
/// Construct through [`ScraperConfigBuilder`](super::ScraperConfigBuilder)
/// or [`ScraperConfig::from_env`](super::types::ScraperConfig::from_env);
/// fields are crate-private so every value passes validation exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Number of concurrent scrape workers. Keep at or below the number of
    /// browser pages the host can sustain.
    pub(crate) max_concurrent_scrapes: usize,
    /// Pending requests beyond this bound are rejected as overloaded.
    pub(crate) max_queue_size: usize,

    /// A stored selector whose extracted text is shorter than this counts
    /// as a failure.
    pub(crate) min_content_chars: usize,
    /// Consecutive stored-selector failures before discovery re-runs.
    pub(crate) rediscovery_threshold: u32,
    /// Extra LLM iterations after the first (total = this + 1).
    pub(crate) max_llm_retries: u32,

    pub(crate) scrape_timeout_secs: u64,
    pub(crate) navigation_timeout_secs: u64,
    pub(crate) llm_timeout_secs: u64,
    pub(crate) captcha_timeout_secs: u64,

    /// OpenAI-compatible chat-completions endpoint.
    pub(crate) llm_endpoint: String,
    pub(crate) llm_api_key: Option<String>,
    pub(crate) llm_model: String,

    /// Base URL of the captcha solving service.
    pub(crate) captcha_endpoint: Option<String>,
    pub(crate) captcha_api_key: Option<String>,

    /// Outbound HTTP proxy, applied to browser and captcha traffic.
    pub(crate) proxy: Option<String>,

    /// Explicit browser binary; auto-discovered when unset.
    pub(crate) browser_executable: Option<PathBuf>,
    /// Unpacked extension directories loaded into the browser.
    pub(crate) extension_dirs: Vec<PathBuf>,
    pub(crate) headless: bool,
    pub(crate) user_agent: Option<String>,

    /// Directory holding the known-sites file and debug artifacts.
    pub(crate) data_dir: PathBuf,

    pub(crate) scoring: ScoringWeights,
}
