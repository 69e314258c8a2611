//! The per-domain site configuration record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Learned extraction rule and health metadata for one normalized domain.
///
/// Created on first successful discovery, updated on every success and
/// failure. Deleted only by operator action, never by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Normalized base domain (lowercase, leading `www.` stripped).
    /// Unique key within the store.
    pub domain_pattern: String,

    /// The learned main-content selector. Never empty.
    pub xpath_main_content: String,

    /// When the selector last produced acceptable content.
    #[serde(default)]
    pub last_successful_scrape: Option<DateTime<Utc>>,

    /// Consecutive failures since the last success. Reset to 0 by any
    /// success; at the rediscovery threshold the selector is re-learned.
    #[serde(default)]
    pub failure_count_since_last_success: u32,

    /// Whether the selector came from the discovery loop (as opposed to
    /// being hand-entered by an operator).
    #[serde(default)]
    pub discovered_by_llm: bool,

    /// Extra request headers sent when loading pages on this domain.
    #[serde(default)]
    pub site_specific_headers: Option<BTreeMap<String, String>>,

    /// Class-name fragments stripped by the DOM simplifier, in addition to
    /// the default unwanted set.
    #[serde(default)]
    pub site_cleanup_classes: Option<Vec<String>>,

    /// User agent sent for this domain instead of the global one.
    #[serde(default)]
    pub user_agent_override: Option<String>,
}

impl SiteConfig {
    /// A fresh record as written by the success path of discovery:
    /// zero failures, timestamp stamped now.
    #[must_use]
    pub fn discovered(domain_pattern: impl Into<String>, xpath: impl Into<String>) -> Self {
        Self {
            domain_pattern: domain_pattern.into(),
            xpath_main_content: xpath.into(),
            last_successful_scrape: Some(Utc::now()),
            failure_count_since_last_success: 0,
            discovered_by_llm: true,
            site_specific_headers: None,
            site_cleanup_classes: None,
            user_agent_override: None,
        }
    }
}
