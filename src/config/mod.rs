//! Configuration for the scraping engine.
//!
//! Every externally supplied value the engine reads — endpoints, credentials,
//! timeouts, concurrency, the data directory — flows through one validated
//! [`ScraperConfig`], built either programmatically via the builder or from
//! the process environment via [`ScraperConfig::from_env`].

pub mod builder;
pub mod env;
pub mod getters;
pub mod types;

pub use builder::ScraperConfigBuilder;
pub use types::{ConfigError, ScraperConfig};
