//! SmartScraper: adaptive main-content extraction.
//!
//! A bounded, concurrent scraping core that fetches pages through a
//! managed browser, extracts article content with a learned per-domain
//! XPath, and — when no selector is known or the known one stops working —
//! asks a language model for candidates and ranks them with a
//! deterministic quality score. Winning selectors persist in a
//! comment-preserving per-domain store; worker status streams to
//! observers over a broadcast bus.
//!
//! ```no_run
//! use smartscraper::{ScrapeEngine, ScrapeRequest, ScraperConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ScraperConfig::from_env()?;
//! let engine = ScrapeEngine::bootstrap(config).await?;
//!
//! match engine.scrape(ScrapeRequest::new("https://example.com/story")).await {
//!     Ok(result) => println!("{}: {}", result.xpath, result.data),
//!     Err(e) => eprintln!("scrape failed ({:?}): {e}", e.kind()),
//! }
//!
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod captcha;
pub mod config;
pub mod discovery;
pub mod dom;
pub mod engine;
pub mod known_sites;
pub mod llm;
pub mod status;
pub mod utils;

pub use browser::{
    Browser, CaptchaKind, CaptchaObservation, ChromiumBrowser, Cookie, ElementDetails,
    ElementProbe, FakeBrowser, LoadPageOptions, PageId, ReloadOptions, WaitUntil,
};
pub use captcha::{
    CaptchaError, CaptchaOutcome, CaptchaSolver, DataDomeSolver, FakeSolver, GenericTokenSolver,
    SolveContext, SolverConfig, SolverRouter,
};
pub use config::{ConfigError, ScraperConfig, ScraperConfigBuilder};
pub use discovery::{DiscoveryOutcome, FeedbackEntry, ScoringWeights};
pub use dom::{extract_snippets, simplify_dom};
pub use engine::{
    ErrorKind, ScrapeEngine, ScrapeError, ScrapeMethod, ScrapeOutput, ScrapeRequest,
    ScrapeResult, ScrapeSuccess,
};
pub use known_sites::{KnownSites, MemorySiteStore, SiteConfig, TomlSiteStore};
pub use llm::{FakeSuggester, OpenAiSuggester, SelectorPrompt, XpathSuggester};
pub use status::{SlotStatus, StatusBus, WorkerSlot, WorkerStatusEvent};
