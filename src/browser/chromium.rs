//! Production browser adapter over chromiumoxide.
//!
//! One Chrome process serves all workers; each scrape owns one page,
//! registered by [`PageId`]. XPath evaluation and element probing run as
//! injected JavaScript returning JSON, so concurrent evaluations against
//! the same page are plain concurrent CDP calls.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide_cdp::cdp::browser_protocol::network::{
    CookieParam, Headers, SetExtraHttpHeadersParams,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::launch::launch_scraper_browser;
use super::{
    Browser, CaptchaObservation, Cookie, ElementProbe, LoadPageOptions, PageId, ReloadOptions,
    WaitUntil, observe_captcha,
};
use crate::config::ScraperConfig;

/// Template for XPath evaluation inside the page. `__XPATH__` is replaced
/// with a JSON-escaped string literal.
const EVALUATE_XPATH_JS: &str = r"(() => {
    const xp = __XPATH__;
    let snap;
    try {
        snap = document.evaluate(xp, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    } catch (e) {
        return null;
    }
    if (snap.snapshotLength === 0) return null;
    const out = [];
    for (let i = 0; i < snap.snapshotLength; i++) {
        out.push(snap.snapshotItem(i).textContent || '');
    }
    return out;
})()";

/// Template probing the first match of an XPath for scoring inputs.
const ELEMENT_PROBE_JS: &str = r"(() => {
    const xp = __XPATH__;
    let snap;
    try {
        snap = document.evaluate(xp, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    } catch (e) {
        return null;
    }
    if (snap.snapshotLength === 0) return null;
    const el = snap.snapshotItem(0);
    if (!el || el.nodeType !== Node.ELEMENT_NODE) return null;
    const count = (t) => el.getElementsByTagName(t).length;
    return {
        tag_name: el.tagName.toLowerCase(),
        id: el.id || '',
        class: el.getAttribute('class') || '',
        text_length: (el.textContent || '').length,
        html_length: (el.outerHTML || '').length,
        descendant_count: el.getElementsByTagName('*').length,
        paragraph_count: count('p'),
        anchor_count: count('a'),
        media_count: count('img') + count('video') + count('audio') + count('picture'),
        unwanted_count: count('nav') + count('aside') + count('footer') + count('header'),
        heading_count: ['h1','h2','h3','h4','h5','h6'].reduce((a, t) => a + count(t), 0),
        list_count: count('ul') + count('ol'),
        matches_in_document: snap.snapshotLength
    };
})()";

/// Chrome-backed implementation of the [`Browser`] contract.
pub struct ChromiumBrowser {
    browser: Mutex<chromiumoxide::Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
    pages: DashMap<u64, Page>,
    next_id: AtomicU64,
    // Held for its Drop: the profile directory outlives the Chrome process.
    _profile_dir: TempDir,
}

impl ChromiumBrowser {
    /// Launch Chrome per `config` and wrap it in the adapter.
    pub async fn launch(config: &ScraperConfig) -> Result<Self> {
        let (browser, handler, profile_dir) = launch_scraper_browser(config).await?;
        info!("Scraper browser launched");
        Ok(Self {
            browser: Mutex::new(browser),
            handler: Mutex::new(Some(handler)),
            pages: DashMap::new(),
            next_id: AtomicU64::new(0),
            _profile_dir: profile_dir,
        })
    }

    fn page(&self, id: PageId) -> Result<Page> {
        self.pages
            .get(&id.0)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| anyhow!("Unknown page id: {id}"))
    }

    async fn evaluate_json<T: serde::de::DeserializeOwned>(
        &self,
        id: PageId,
        template: &str,
        xpath: &str,
    ) -> Result<T> {
        let page = self.page(id)?;
        let literal =
            serde_json::to_string(xpath).context("Failed to encode XPath as JS literal")?;
        let script = template.replace("__XPATH__", &literal);
        let result = page
            .evaluate(script)
            .await
            .context("Failed to evaluate XPath script")?;
        result
            .into_value::<T>()
            .context("Failed to parse XPath script result")
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn load_page(&self, url: &str, opts: LoadPageOptions) -> Result<PageId> {
        if opts.proxy.is_some() {
            // Chrome takes its proxy at process launch; per-request proxies
            // need a separate browser instance.
            warn!("Per-request proxy ignored by the Chromium adapter");
        }

        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("Failed to open a new page")?
        };

        if let Some(ua) = &opts.user_agent {
            page.set_user_agent(ua.as_str())
                .await
                .context("Failed to set user agent")?;
        }

        if !opts.headers.is_empty() {
            let headers = serde_json::to_value(&opts.headers)
                .context("Failed to encode extra headers")?;
            page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
                .await
                .context("Failed to set extra headers")?;
        }

        let navigation = async {
            page.goto(url).await.context("Navigation failed")?;
            page.wait_for_navigation()
                .await
                .context("Page never settled")?;
            Ok::<(), anyhow::Error>(())
        };

        if let Err(e) = tokio::time::timeout(opts.timeout, navigation)
            .await
            .map_err(|_| anyhow!("Navigation timed out after {:?}", opts.timeout))
            .and_then(|r| r)
        {
            if let Err(close_err) = page.close().await {
                debug!("Failed to close page after navigation error: {close_err}");
            }
            return Err(e);
        }

        let id = PageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pages.insert(id.0, page);
        debug!(%id, url, "Page loaded");
        Ok(id)
    }

    async fn close_page(&self, id: PageId) -> Result<()> {
        if let Some((_, page)) = self.pages.remove(&id.0) {
            page.close().await.context("Failed to close page")?;
            debug!(%id, "Page closed");
        }
        Ok(())
    }

    async fn get_html(&self, id: PageId) -> Result<String> {
        let page = self.page(id)?;
        page.content().await.context("Failed to read page HTML")
    }

    async fn evaluate_xpath(&self, id: PageId, xpath: &str) -> Result<Option<Vec<String>>> {
        self.evaluate_json(id, EVALUATE_XPATH_JS, xpath).await
    }

    async fn get_element_details(&self, id: PageId, xpath: &str) -> Result<Option<ElementProbe>> {
        self.evaluate_json(id, ELEMENT_PROBE_JS, xpath).await
    }

    async fn detect_captcha(&self, id: PageId) -> Result<CaptchaObservation> {
        let html = self.get_html(id).await?;
        Ok(observe_captcha(&html))
    }

    async fn get_cookies(&self, id: PageId) -> Result<Vec<Cookie>> {
        let page = self.page(id)?;
        let cookies = page.get_cookies().await.context("Failed to read cookies")?;
        Ok(cookies
            .into_iter()
            .map(|c| Cookie {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                url: None,
            })
            .collect())
    }

    async fn set_cookie(&self, id: PageId, cookie: Cookie) -> Result<()> {
        let page = self.page(id)?;
        let url = match (&cookie.url, &cookie.domain) {
            (Some(url), _) => url.clone(),
            (None, _) => page
                .url()
                .await
                .context("Failed to read page URL")?
                .ok_or_else(|| anyhow!("Page has no URL to scope the cookie to"))?,
        };

        let param = CookieParam::builder()
            .name(cookie.name)
            .value(cookie.value)
            .url(url)
            .build()
            .map_err(|e| anyhow!("Invalid cookie: {e}"))?;

        page.set_cookie(param)
            .await
            .context("Failed to set cookie")?;
        Ok(())
    }

    async fn reload(&self, id: PageId, opts: ReloadOptions) -> Result<()> {
        let page = self.page(id)?;

        let reload = async {
            page.reload().await.context("Reload failed")?;
            if opts.wait_until == WaitUntil::NetworkIdle {
                page.wait_for_navigation()
                    .await
                    .context("Page never settled after reload")?;
            }
            Ok::<(), anyhow::Error>(())
        };

        // The caller's timeout, verbatim. No hidden default here.
        tokio::time::timeout(opts.timeout, reload)
            .await
            .map_err(|_| anyhow!("Reload timed out after {:?}", opts.timeout))
            .and_then(|r| r)
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down browser adapter");

        let ids: Vec<u64> = self.pages.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, page)) = self.pages.remove(&id)
                && let Err(e) = page.close().await
            {
                warn!("Failed to close page {id} during shutdown: {e}");
            }
        }

        {
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser: {e}");
            }
            let _ = browser.wait().await;
        }

        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }

        info!("Browser adapter shutdown complete");
        Ok(())
    }
}
