//! Core request and result types for scrape operations.
//!
//! A [`ScrapeRequest`] is created by the caller and is immutable once
//! submitted. The engine answers with `Result<ScrapeSuccess, ScrapeError>`:
//! operational failures are returned, never thrown. Panics are reserved for
//! programmer misuse.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the caller wants back from a scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapeOutput {
    /// Text content of the main-content element (default).
    ContentOnly,
    /// Outer HTML of the whole loaded document.
    FullHtml,
    /// Page metadata only (title, canonical URL) without body content.
    MetadataOnly,
}

impl Default for ScrapeOutput {
    fn default() -> Self {
        Self::ContentOnly
    }
}

/// How the winning selector was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScrapeMethod {
    /// A stored selector from the known-sites store worked.
    KnownConfig,
    /// The discovery loop found and persisted a new selector.
    Discovered,
    /// The caller supplied an explicit XPath override.
    Override,
}

/// A single scrape job. Immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    #[serde(default)]
    pub output: ScrapeOutput,
    /// Explicit XPath; bypasses the store and the discovery loop entirely.
    #[serde(default)]
    pub xpath_override: Option<String>,
    /// When set, a missing or failing stored selector is a terminal
    /// extraction failure instead of a discovery trigger.
    #[serde(default)]
    pub disable_discovery: bool,
    /// Caller-supplied correlation id carried into logs and debug artifacts.
    #[serde(default)]
    pub debug_context_id: Option<String>,
}

impl ScrapeRequest {
    /// Create a request for `url` with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output: ScrapeOutput::default(),
            xpath_override: None,
            disable_discovery: false,
            debug_context_id: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: ScrapeOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_xpath_override(mut self, xpath: impl Into<String>) -> Self {
        self.xpath_override = Some(xpath.into());
        self
    }

    #[must_use]
    pub fn with_disable_discovery(mut self, disable: bool) -> Self {
        self.disable_discovery = disable;
        self
    }

    #[must_use]
    pub fn with_debug_context_id(mut self, id: impl Into<String>) -> Self {
        self.debug_context_id = Some(id.into());
        self
    }
}

/// Successful scrape outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeSuccess {
    pub method: ScrapeMethod,
    /// The XPath that produced `data`.
    pub xpath: String,
    /// Extracted content per the request's [`ScrapeOutput`].
    pub data: String,
    /// Wall-clock time from admission to completion.
    pub duration: Duration,
}

/// Surface-level error category, stable across the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    Network,
    Captcha,
    Extraction,
    Llm,
    Overloaded,
    Internal,
}

/// Failure result for a scrape.
///
/// Messages are written for operators; raw provider payloads and stack
/// detail stay in the logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    /// Bad input or misconfiguration (invalid URL, cancelled before start,
    /// unusable store file).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Navigation failure: DNS, TLS, connection, page-load timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// An anti-bot challenge was detected and could not be resolved.
    #[error("Captcha error: {0}")]
    Captcha(String),

    /// No candidate met the scoring or content thresholds, or a stored
    /// selector returned too little content without triggering rediscovery.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// LLM provider failure, or an unparseable reply after all strategies.
    #[error("LLM error: {0}")]
    Llm(String),

    /// The pending queue is full; back off and retry later.
    #[error("Engine overloaded: {0}")]
    Overloaded(String),

    /// Unexpected invariant violation inside the engine.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// The surface-level category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network(_) => ErrorKind::Network,
            Self::Captcha(_) => ErrorKind::Captcha,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Llm(_) => ErrorKind::Llm,
            Self::Overloaded(_) => ErrorKind::Overloaded,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for ScrapeError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain from adapter internals
        Self::Internal(format!("{err:#}"))
    }
}

/// Convenience alias used throughout the engine.
pub type ScrapeResult = Result<ScrapeSuccess, ScrapeError>;
