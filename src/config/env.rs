//! Environment-variable configuration surface.
//!
//! `SMARTSCRAPER_*` variables are read once at startup and validated through
//! the builder; nothing in the engine reads the environment directly.

use std::env;

use super::builder::ScraperConfigBuilder;
use super::types::{ConfigError, ScraperConfig};

impl ScraperConfig {
    /// Load configuration from the process environment.
    ///
    /// Recognized variables:
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `SMARTSCRAPER_LLM_ENDPOINT` | OpenAI-compatible chat-completions URL |
    /// | `SMARTSCRAPER_LLM_API_KEY` | Bearer credential for the LLM service |
    /// | `SMARTSCRAPER_LLM_MODEL` | Model name sent with each request |
    /// | `SMARTSCRAPER_CAPTCHA_ENDPOINT` | Captcha solver base URL |
    /// | `SMARTSCRAPER_CAPTCHA_API_KEY` | Captcha solver credential |
    /// | `SMARTSCRAPER_PROXY` | Outbound HTTP proxy |
    /// | `SMARTSCRAPER_BROWSER_EXECUTABLE` | Browser binary path |
    /// | `SMARTSCRAPER_EXTENSION_DIRS` | `:`-separated unpacked extension dirs |
    /// | `SMARTSCRAPER_DATA_DIR` | Data directory (known-sites file lives here) |
    /// | `SMARTSCRAPER_CONCURRENCY` | Worker count |
    /// | `SMARTSCRAPER_HEADLESS` | `true`/`false` |
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable numeric or boolean values and
    /// for anything the builder's validation rejects.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = ScraperConfigBuilder::new();

        if let Ok(endpoint) = env::var("SMARTSCRAPER_LLM_ENDPOINT") {
            builder = builder.llm_endpoint(endpoint);
        }
        if let Ok(key) = env::var("SMARTSCRAPER_LLM_API_KEY") {
            builder = builder.llm_api_key(key);
        }
        if let Ok(model) = env::var("SMARTSCRAPER_LLM_MODEL") {
            builder = builder.llm_model(model);
        }
        if let Ok(endpoint) = env::var("SMARTSCRAPER_CAPTCHA_ENDPOINT") {
            builder = builder.captcha_endpoint(endpoint);
        }
        if let Ok(key) = env::var("SMARTSCRAPER_CAPTCHA_API_KEY") {
            builder = builder.captcha_api_key(key);
        }
        if let Ok(proxy) = env::var("SMARTSCRAPER_PROXY") {
            builder = builder.proxy(proxy);
        }
        if let Ok(path) = env::var("SMARTSCRAPER_BROWSER_EXECUTABLE") {
            builder = builder.browser_executable(path);
        }
        if let Ok(dirs) = env::var("SMARTSCRAPER_EXTENSION_DIRS") {
            for dir in dirs.split(':').filter(|d| !d.is_empty()) {
                builder = builder.extension_dir(dir);
            }
        }
        if let Ok(dir) = env::var("SMARTSCRAPER_DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        if let Ok(concurrency) = env::var("SMARTSCRAPER_CONCURRENCY") {
            let parsed = concurrency.parse::<usize>().map_err(|e| ConfigError::Invalid {
                field: "SMARTSCRAPER_CONCURRENCY",
                message: e.to_string(),
            })?;
            builder = builder.max_concurrent_scrapes(parsed);
        }
        if let Ok(headless) = env::var("SMARTSCRAPER_HEADLESS") {
            let parsed = headless.parse::<bool>().map_err(|e| ConfigError::Invalid {
                field: "SMARTSCRAPER_HEADLESS",
                message: e.to_string(),
            })?;
            builder = builder.headless(parsed);
        }

        builder.build()
    }
}
