//! Scriptable in-memory browser for tests.
//!
//! Pages are dictionaries of XPath fixtures instead of live documents.
//! The fake records loads, reloads (with the timeout it was given), and
//! installed cookies so tests can assert on the engine's browser protocol.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::{
    Browser, CaptchaObservation, Cookie, ElementDetails, ElementProbe, LoadPageOptions, PageId,
    ReloadOptions,
};

/// Scripted result set for one XPath on a fake page.
#[derive(Debug, Clone, Default)]
pub struct XpathFixture {
    /// Text content per match; `evaluate_xpath` returns these.
    pub texts: Vec<String>,
    /// Probe for the first match; `None` simulates a non-element result.
    pub probe: Option<ElementProbe>,
}

impl XpathFixture {
    /// A fixture that looks like a healthy article container.
    #[must_use]
    pub fn article(paragraphs: u32, text_length: u64, matches: u32) -> Self {
        let text = "x".repeat(usize::try_from(text_length).unwrap_or(usize::MAX));
        Self {
            texts: vec![text],
            probe: Some(ElementProbe {
                details: ElementDetails {
                    tag_name: "article".to_string(),
                    id: "content".to_string(),
                    class: String::new(),
                    text_length,
                    html_length: text_length * 2,
                    descendant_count: paragraphs * 3,
                    paragraph_count: paragraphs,
                    anchor_count: 1,
                    media_count: 1,
                    unwanted_count: 0,
                    heading_count: 1,
                    list_count: 0,
                },
                matches_in_document: matches,
            }),
        }
    }
}

/// Scripted behavior for one URL.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pub html: String,
    /// Observations handed out by successive `detect_captcha` calls on a
    /// page of this site; exhausted queue means no challenge.
    pub captcha_sequence: Vec<CaptchaObservation>,
    pub xpaths: HashMap<String, XpathFixture>,
    pub fail_navigation: bool,
    /// Simulated navigation latency.
    pub load_delay: Option<Duration>,
}

impl FakeSite {
    #[must_use]
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_xpath(mut self, xpath: impl Into<String>, fixture: XpathFixture) -> Self {
        self.xpaths.insert(xpath.into(), fixture);
        self
    }

    #[must_use]
    pub fn with_captcha_sequence(mut self, sequence: Vec<CaptchaObservation>) -> Self {
        self.captcha_sequence = sequence;
        self
    }

    #[must_use]
    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }
}

struct FakePage {
    url: String,
    captcha_queue: VecDeque<CaptchaObservation>,
}

/// In-memory [`Browser`] implementation.
#[derive(Default)]
pub struct FakeBrowser {
    sites: Mutex<HashMap<String, FakeSite>>,
    pages: DashMap<u64, FakePage>,
    next_id: AtomicU64,
    open_pages: AtomicUsize,
    loads: Mutex<Vec<(String, LoadPageOptions)>>,
    reloads: Mutex<Vec<(PageId, Duration)>>,
    cookies: Mutex<Vec<(PageId, Cookie)>>,
}

impl FakeBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: impl Into<String>, site: FakeSite) {
        self.sites.lock().insert(url.into(), site);
    }

    /// Pages currently open; the engine must drive this back to zero.
    #[must_use]
    pub fn open_page_count(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    /// Every load performed, in order, with the options used.
    #[must_use]
    pub fn load_log(&self) -> Vec<(String, LoadPageOptions)> {
        self.loads.lock().clone()
    }

    /// Every reload performed with the timeout it carried.
    #[must_use]
    pub fn reload_log(&self) -> Vec<(PageId, Duration)> {
        self.reloads.lock().clone()
    }

    /// Every cookie installed.
    #[must_use]
    pub fn cookie_log(&self) -> Vec<(PageId, Cookie)> {
        self.cookies.lock().clone()
    }

    fn site_for(&self, url: &str) -> Result<FakeSite> {
        self.sites
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("No fake site registered for {url}"))
    }

    fn page_url(&self, id: PageId) -> Result<String> {
        self.pages
            .get(&id.0)
            .map(|p| p.url.clone())
            .ok_or_else(|| anyhow!("Unknown page id: {id}"))
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn load_page(&self, url: &str, opts: LoadPageOptions) -> Result<PageId> {
        self.loads.lock().push((url.to_string(), opts));

        let site = self.site_for(url)?;
        if let Some(delay) = site.load_delay {
            tokio::time::sleep(delay).await;
        }
        if site.fail_navigation {
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED for {url}"));
        }

        let id = PageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pages.insert(
            id.0,
            FakePage {
                url: url.to_string(),
                captcha_queue: site.captcha_sequence.into_iter().collect(),
            },
        );
        self.open_pages.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn close_page(&self, id: PageId) -> Result<()> {
        if self.pages.remove(&id.0).is_some() {
            self.open_pages.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn get_html(&self, id: PageId) -> Result<String> {
        let url = self.page_url(id)?;
        Ok(self.site_for(&url)?.html)
    }

    async fn evaluate_xpath(&self, id: PageId, xpath: &str) -> Result<Option<Vec<String>>> {
        let url = self.page_url(id)?;
        Ok(self.site_for(&url)?.xpaths.get(xpath).map(|f| f.texts.clone()))
    }

    async fn get_element_details(&self, id: PageId, xpath: &str) -> Result<Option<ElementProbe>> {
        let url = self.page_url(id)?;
        Ok(self
            .site_for(&url)?
            .xpaths
            .get(xpath)
            .and_then(|f| f.probe.clone()))
    }

    async fn detect_captcha(&self, id: PageId) -> Result<CaptchaObservation> {
        let mut page = self
            .pages
            .get_mut(&id.0)
            .ok_or_else(|| anyhow!("Unknown page id: {id}"))?;
        Ok(page
            .captcha_queue
            .pop_front()
            .unwrap_or_else(CaptchaObservation::none))
    }

    async fn get_cookies(&self, id: PageId) -> Result<Vec<Cookie>> {
        let _ = self.page_url(id)?;
        Ok(self
            .cookies
            .lock()
            .iter()
            .filter(|(page, _)| *page == id)
            .map(|(_, cookie)| cookie.clone())
            .collect())
    }

    async fn set_cookie(&self, id: PageId, cookie: Cookie) -> Result<()> {
        let _ = self.page_url(id)?;
        self.cookies.lock().push((id, cookie));
        Ok(())
    }

    async fn reload(&self, id: PageId, opts: ReloadOptions) -> Result<()> {
        let _ = self.page_url(id)?;
        self.reloads.lock().push((id, opts.timeout));
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        let ids: Vec<u64> = self.pages.iter().map(|e| *e.key()).collect();
        for id in ids {
            if self.pages.remove(&id).is_some() {
                self.open_pages.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
