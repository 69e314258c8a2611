//! The per-request scrape flow.
//!
//! Validate → lookup → fetch → captcha check → extract or discover. Every
//! terminal transition releases the page; the guard covers error paths and
//! cancellation as well.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{ScrapeError, ScrapeMethod, ScrapeOutput, ScrapeRequest};
use crate::browser::{Browser, Cookie, LoadPageOptions, PageId, ReloadOptions, WaitUntil};
use crate::captcha::{CaptchaSolver, SolveContext};
use crate::config::ScraperConfig;
use crate::discovery::DiscoveryLoop;
use crate::known_sites::{KnownSites, SiteConfig};
use crate::llm::XpathSuggester;
use crate::utils::{is_valid_scrape_url, normalize_domain};

/// Collaborators threaded through one scrape execution.
pub(crate) struct ScrapeContext<'a> {
    pub config: &'a ScraperConfig,
    pub browser: &'a dyn Browser,
    pub store: &'a dyn KnownSites,
    pub suggester: &'a dyn XpathSuggester,
    pub solver: Option<&'a dyn CaptchaSolver>,
}

/// What a scrape produced, before the gate stamps duration and identity.
pub(crate) struct ScrapeYield {
    pub method: ScrapeMethod,
    pub xpath: String,
    pub data: String,
}

/// Releases the page on drop so no exit path leaks it. Dropping spawns the
/// close since `Drop` cannot await; the normal path closes explicitly.
struct PageGuard {
    browser: Arc<dyn Browser>,
    page: Option<PageId>,
}

impl PageGuard {
    fn new(browser: Arc<dyn Browser>, page: PageId) -> Self {
        Self {
            browser,
            page: Some(page),
        }
    }

    async fn release(mut self) {
        if let Some(page) = self.page.take()
            && let Err(e) = self.browser.close_page(page).await
        {
            warn!(%page, "Failed to close page: {e:#}");
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            let browser = Arc::clone(&self.browser);
            tokio::spawn(async move {
                if let Err(e) = browser.close_page(page).await {
                    warn!(%page, "Failed to close page from guard: {e:#}");
                }
            });
        }
    }
}

/// Run the state machine for one request against an already-admitted slot.
pub(crate) async fn execute_scrape(
    ctx: &ScrapeContext<'_>,
    browser_arc: &Arc<dyn Browser>,
    request: &ScrapeRequest,
) -> Result<ScrapeYield, ScrapeError> {
    // Validate
    if !is_valid_scrape_url(&request.url) {
        return Err(ScrapeError::Configuration(format!(
            "Not a scrapeable URL: '{}'",
            request.url
        )));
    }
    if let Some(xpath) = &request.xpath_override
        && xpath.trim().is_empty()
    {
        return Err(ScrapeError::Configuration(
            "xpath_override must not be empty".to_string(),
        ));
    }

    let domain = normalize_domain(&request.url)
        .map_err(|e| ScrapeError::Configuration(format!("{e:#}")))?;

    // Lookup
    let site = ctx
        .store
        .get(&domain)
        .await
        .map_err(|e| ScrapeError::Internal(format!("Known-sites lookup failed: {e:#}")))?;

    // Fetch
    let user_agent = site
        .as_ref()
        .and_then(|s| s.user_agent_override.clone())
        .or_else(|| ctx.config.user_agent().map(str::to_string));
    let headers: BTreeMap<String, String> = site
        .as_ref()
        .and_then(|s| s.site_specific_headers.clone())
        .unwrap_or_default();

    let load_opts = LoadPageOptions {
        timeout: ctx.config.navigation_timeout(),
        user_agent: user_agent.clone(),
        proxy: ctx.config.proxy().map(str::to_string),
        headers,
    };

    let page = match ctx.browser.load_page(&request.url, load_opts).await {
        Ok(page) => page,
        Err(e) => {
            if site.is_some() {
                if let Err(store_err) = ctx.store.increment_failure(&domain).await {
                    warn!(domain, "Failed to record navigation failure: {store_err:#}");
                }
            }
            return Err(ScrapeError::Network(format!("{e:#}")));
        }
    };
    let guard = PageGuard::new(Arc::clone(browser_arc), page);

    let result = scrape_loaded_page(ctx, request, &domain, site, page, user_agent.as_deref()).await;
    guard.release().await;
    result
}

/// Everything after the page exists; separated so the caller can release
/// the page exactly once on every path.
async fn scrape_loaded_page(
    ctx: &ScrapeContext<'_>,
    request: &ScrapeRequest,
    domain: &str,
    site: Option<SiteConfig>,
    page: PageId,
    user_agent: Option<&str>,
) -> Result<ScrapeYield, ScrapeError> {
    // DetectCaptcha → SolveCaptcha (at most one solve + reload cycle)
    let observation = ctx
        .browser
        .detect_captcha(page)
        .await
        .map_err(|e| ScrapeError::Internal(format!("Captcha inspection failed: {e:#}")))?;

    if observation.is_challenge() {
        let Some(solver) = ctx.solver else {
            return Err(ScrapeError::Captcha(
                "Challenge detected and no solver is configured".to_string(),
            ));
        };

        info!(url = request.url, kind = ?observation.kind, "Solving challenge");
        let outcome = solver
            .solve_if_present(SolveContext {
                page_url: &request.url,
                observation: &observation,
                user_agent,
                proxy: ctx.config.proxy(),
            })
            .await
            .map_err(|e| ScrapeError::Captcha(format!("{e}")))?;

        if !outcome.solved {
            return Err(ScrapeError::Captcha(
                outcome
                    .reason
                    .unwrap_or_else(|| "Solver could not resolve the challenge".to_string()),
            ));
        }

        if let Some(pair) = &outcome.updated_cookie {
            let cookie = Cookie::from_pair(pair).ok_or_else(|| {
                ScrapeError::Captcha(format!("Solver returned an unusable cookie: '{pair}'"))
            })?;
            ctx.browser
                .set_cookie(page, cookie)
                .await
                .map_err(|e| ScrapeError::Captcha(format!("Failed to install cookie: {e:#}")))?;
        }

        // Reload with the request-derived timeout; the adapter must not
        // substitute a default.
        ctx.browser
            .reload(
                page,
                ReloadOptions {
                    timeout: ctx.config.navigation_timeout(),
                    wait_until: WaitUntil::Load,
                },
            )
            .await
            .map_err(|e| ScrapeError::Network(format!("Reload after solve failed: {e:#}")))?;

        let second = ctx
            .browser
            .detect_captcha(page)
            .await
            .map_err(|e| ScrapeError::Internal(format!("Captcha inspection failed: {e:#}")))?;
        if second.is_challenge() {
            return Err(ScrapeError::Captcha(
                "Challenge persisted after a successful solve".to_string(),
            ));
        }
    }

    // ExtractOrDiscover
    if let Some(xpath) = &request.xpath_override {
        // Override: no persistence, no rediscovery, no store updates.
        let text = extract_first_text(ctx.browser, page, xpath).await?;
        return match text {
            Some(_) => Ok(ScrapeYield {
                method: ScrapeMethod::Override,
                xpath: xpath.clone(),
                data: render_output(ctx.browser, page, xpath, request.output).await?,
            }),
            None => Err(ScrapeError::Extraction(format!(
                "Override selector '{xpath}' matched nothing"
            ))),
        };
    }

    if let Some(site) = &site {
        let stored_xpath = &site.xpath_main_content;
        let text = extract_first_text(ctx.browser, page, stored_xpath)
            .await?
            .unwrap_or_default();
        let content_chars = text.chars().count();

        if content_chars >= ctx.config.min_content_chars() {
            ctx.store
                .mark_success(domain)
                .await
                .map_err(|e| ScrapeError::Internal(format!("Failed to record success: {e:#}")))?;
            let data = match request.output {
                ScrapeOutput::ContentOnly => text,
                other => render_output(ctx.browser, page, stored_xpath, other).await?,
            };
            return Ok(ScrapeYield {
                method: ScrapeMethod::KnownConfig,
                xpath: stored_xpath.clone(),
                data,
            });
        }

        debug!(
            domain,
            content_chars,
            threshold = ctx.config.min_content_chars(),
            "Stored selector under content threshold"
        );

        if request.disable_discovery {
            return Err(ScrapeError::Extraction(format!(
                "Stored selector returned {content_chars} characters and discovery is disabled"
            )));
        }

        let failures = ctx
            .store
            .increment_failure(domain)
            .await
            .map_err(|e| ScrapeError::Internal(format!("Failed to record failure: {e:#}")))?
            .unwrap_or(0);

        if failures < ctx.config.rediscovery_threshold() {
            // Below the threshold this stays a visible extraction failure;
            // rediscovering here would mask degraded sites and burn LLM
            // budget on every transient hiccup.
            return Err(ScrapeError::Extraction(format!(
                "Stored selector returned {content_chars} characters (minimum {})",
                ctx.config.min_content_chars()
            )));
        }
    } else if request.disable_discovery {
        return Err(ScrapeError::Extraction(
            "No stored selector for this domain and discovery is disabled".to_string(),
        ));
    }

    // Discovery
    discover_and_persist(ctx, request, domain, site.as_ref(), page).await
}

async fn discover_and_persist(
    ctx: &ScrapeContext<'_>,
    request: &ScrapeRequest,
    domain: &str,
    site: Option<&SiteConfig>,
    page: PageId,
) -> Result<ScrapeYield, ScrapeError> {
    let html = ctx
        .browser
        .get_html(page)
        .await
        .map_err(|e| ScrapeError::Internal(format!("Failed to read page HTML: {e:#}")))?;

    let cleanup_classes = site
        .and_then(|s| s.site_cleanup_classes.clone())
        .unwrap_or_default();

    let driver = DiscoveryLoop::new(
        ctx.browser,
        ctx.suggester,
        ctx.config.scoring(),
        ctx.config.max_llm_retries(),
    );
    let outcome = driver
        .discover(page, &request.url, &html, &cleanup_classes)
        .await?;

    let Some(outcome) = outcome else {
        return Err(ScrapeError::Extraction(
            "No selector candidate met the quality thresholds".to_string(),
        ));
    };

    // Persist the winner, carrying over per-site tweaks from any existing
    // record. Written by a success path, so failures are zero.
    let mut record = SiteConfig::discovered(domain, &outcome.xpath);
    if let Some(existing) = site {
        record.site_specific_headers = existing.site_specific_headers.clone();
        record.site_cleanup_classes = existing.site_cleanup_classes.clone();
        record.user_agent_override = existing.user_agent_override.clone();
    }
    ctx.store
        .put(record)
        .await
        .map_err(|e| ScrapeError::Internal(format!("Failed to persist selector: {e:#}")))?;

    let data = match request.output {
        ScrapeOutput::ContentOnly => outcome.content,
        other => render_output(ctx.browser, page, &outcome.xpath, other).await?,
    };

    Ok(ScrapeYield {
        method: ScrapeMethod::Discovered,
        xpath: outcome.xpath,
        data,
    })
}

/// Text content of the first match, or `None` when nothing matched.
async fn extract_first_text(
    browser: &dyn Browser,
    page: PageId,
    xpath: &str,
) -> Result<Option<String>, ScrapeError> {
    browser
        .evaluate_xpath(page, xpath)
        .await
        .map(|texts| texts.and_then(|t| t.into_iter().next()))
        .map_err(|e| ScrapeError::Internal(format!("XPath evaluation failed: {e:#}")))
}

/// Produce the response payload for the request's output type.
async fn render_output(
    browser: &dyn Browser,
    page: PageId,
    xpath: &str,
    output: ScrapeOutput,
) -> Result<String, ScrapeError> {
    match output {
        ScrapeOutput::ContentOnly => extract_first_text(browser, page, xpath)
            .await?
            .ok_or_else(|| {
                ScrapeError::Extraction(format!("Selector '{xpath}' matched nothing"))
            }),
        ScrapeOutput::FullHtml => browser
            .get_html(page)
            .await
            .map_err(|e| ScrapeError::Internal(format!("Failed to read page HTML: {e:#}"))),
        ScrapeOutput::MetadataOnly => {
            let title = extract_first_text(browser, page, "/html/head/title")
                .await?
                .unwrap_or_default();
            serde_json::to_string(&serde_json::json!({ "title": title }))
                .map_err(|e| ScrapeError::Internal(format!("Failed to encode metadata: {e}")))
        }
    }
}
