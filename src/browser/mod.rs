//! Browser capability: the contract the engine drives pages through.
//!
//! One production implementation ([`ChromiumBrowser`]) over chromiumoxide
//! and one scriptable in-memory fake ([`FakeBrowser`]) for tests. A page is
//! exclusive to one scrape for its lifetime and is addressed by an opaque
//! [`PageId`].

pub mod chromium;
pub mod fake;
pub mod launch;

pub use chromium::ChromiumBrowser;
pub use fake::{FakeBrowser, FakeSite, XpathFixture};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

/// Opaque handle to a loaded page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

/// Options for the initial navigation.
#[derive(Debug, Clone)]
pub struct LoadPageOptions {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl LoadPageOptions {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            user_agent: None,
            proxy: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Navigation settle condition for reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

/// Options for a page reload. The timeout is the caller's; implementations
/// must not substitute their own default.
#[derive(Debug, Clone, Copy)]
pub struct ReloadOptions {
    pub timeout: Duration,
    pub wait_until: WaitUntil,
}

/// A cookie as read from or installed into a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Cookie {
    /// Parse a `name=value` pair as returned by captcha solvers.
    #[must_use]
    pub fn from_pair(pair: &str) -> Option<Self> {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: None,
            url: None,
        })
    }
}

/// Aggregated structure counts for one matched element, as measured inside
/// the live page. Owned by the discovery iteration that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDetails {
    pub tag_name: String,
    pub id: String,
    pub class: String,
    pub text_length: u64,
    pub html_length: u64,
    pub descendant_count: u32,
    pub paragraph_count: u32,
    pub anchor_count: u32,
    /// img + video + audio + picture descendants.
    pub media_count: u32,
    /// nav + aside + footer + header descendants.
    pub unwanted_count: u32,
    pub heading_count: u32,
    pub list_count: u32,
}

/// [`ElementDetails`] for the first match plus how many nodes the XPath
/// matched document-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementProbe {
    #[serde(flatten)]
    pub details: ElementDetails,
    pub matches_in_document: u32,
}

/// What kind of anti-bot interstitial the page is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptchaKind {
    None,
    Generic,
    DataDome,
}

/// Result of inspecting a loaded page for anti-bot challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaObservation {
    pub kind: CaptchaKind,
    pub site_key: Option<String>,
    pub iframe_url: Option<String>,
}

impl CaptchaObservation {
    #[must_use]
    pub fn none() -> Self {
        Self {
            kind: CaptchaKind::None,
            site_key: None,
            iframe_url: None,
        }
    }

    #[must_use]
    pub fn is_challenge(&self) -> bool {
        self.kind != CaptchaKind::None
    }
}

/// The browser contract consumed by the engine.
///
/// Concurrent `evaluate_xpath`/`get_element_details` calls against the same
/// page are permitted; everything else is one-caller-at-a-time per page.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate a fresh page to `url`. The page stays open until
    /// [`close_page`](Browser::close_page).
    async fn load_page(&self, url: &str, opts: LoadPageOptions) -> Result<PageId>;

    async fn close_page(&self, page: PageId) -> Result<()>;

    async fn get_html(&self, page: PageId) -> Result<String>;

    /// Evaluate an XPath, returning the text content of every match, or
    /// `None` when nothing matched.
    async fn evaluate_xpath(&self, page: PageId, xpath: &str) -> Result<Option<Vec<String>>>;

    /// Measure the first match of an XPath. `None` when nothing matched.
    async fn get_element_details(&self, page: PageId, xpath: &str) -> Result<Option<ElementProbe>>;

    async fn detect_captcha(&self, page: PageId) -> Result<CaptchaObservation>;

    async fn get_cookies(&self, page: PageId) -> Result<Vec<Cookie>>;

    async fn set_cookie(&self, page: PageId, cookie: Cookie) -> Result<()>;

    /// Reload the page with the caller-supplied timeout.
    async fn reload(&self, page: PageId, opts: ReloadOptions) -> Result<()>;

    /// Close every open page and release the underlying browser.
    async fn shutdown(&self) -> Result<()>;
}

// =============================================================================
// Challenge detection over raw HTML
// =============================================================================

static DATADOME_IFRAME: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"<iframe[^>]+src\s*=\s*["']([^"']*captcha-delivery\.com[^"']*)["']"#)
        .expect("hardcoded DataDome iframe regex is valid")
});

static SITE_KEY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"data-sitekey\s*=\s*["']([^"']+)["']"#)
        .expect("hardcoded sitekey regex is valid")
});

const VERIFY_MARKERS: &[&str] = &[
    "verifying you are human",
    "please verify you are a human",
    "checking your browser before accessing",
    "prove you are human",
    "checking if the site connection is secure",
    "just a moment...",
];

const WIDGET_MARKERS: &[&str] = &["g-recaptcha", "h-captcha", "cf-turnstile"];

/// Classify a loaded page's HTML as clean, a generic challenge, or a
/// DataDome slider. Pure so it can be tested without a browser.
#[must_use]
pub fn observe_captcha(html: &str) -> CaptchaObservation {
    let lowered = html.to_ascii_lowercase();

    if lowered.contains("captcha-delivery.com") || lowered.contains("geo.captcha-delivery.com") {
        let iframe_url = DATADOME_IFRAME
            .captures(html)
            .map(|c| c[1].to_string());
        return CaptchaObservation {
            kind: CaptchaKind::DataDome,
            site_key: None,
            iframe_url,
        };
    }

    let has_widget = WIDGET_MARKERS.iter().any(|m| lowered.contains(m));
    let has_interstitial_text = VERIFY_MARKERS.iter().any(|m| lowered.contains(m));
    if has_widget && has_interstitial_text {
        let site_key = SITE_KEY.captures(html).map(|c| c[1].to_string());
        return CaptchaObservation {
            kind: CaptchaKind::Generic,
            site_key,
            iframe_url: None,
        };
    }

    CaptchaObservation::none()
}
