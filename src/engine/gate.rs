//! Bounded admission and the worker pool.
//!
//! Requests queue FIFO in front of `N` worker permits; anything beyond the
//! queue bound is rejected immediately as overloaded. Tracking is by the
//! fresh `scrape_id` minted at admission, never by URL, so concurrent
//! scrapes of one URL stay independently observable.

use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::scrape::{ScrapeContext, execute_scrape};
use super::types::{ScrapeError, ScrapeRequest, ScrapeResult, ScrapeSuccess};
use crate::browser::Browser;
use crate::captcha::CaptchaSolver;
use crate::config::ScraperConfig;
use crate::known_sites::KnownSites;
use crate::llm::XpathSuggester;
use crate::status::StatusBus;

static GLOBAL_ENGINE: OnceCell<Arc<ScrapeEngine>> = OnceCell::new();

/// The scraping engine: admission gate, worker pool, and collaborators.
pub struct ScrapeEngine {
    config: ScraperConfig,
    browser: Arc<dyn Browser>,
    store: Arc<dyn KnownSites>,
    suggester: Arc<dyn XpathSuggester>,
    solver: Option<Arc<dyn CaptchaSolver>>,
    bus: Arc<StatusBus>,
    worker_permits: Arc<Semaphore>,
    free_slots: parking_lot::Mutex<VecDeque<usize>>,
    pending: AtomicUsize,
    accepting: AtomicBool,
}

impl ScrapeEngine {
    /// Assemble an engine from explicit collaborators.
    pub fn new(
        config: ScraperConfig,
        browser: Arc<dyn Browser>,
        store: Arc<dyn KnownSites>,
        suggester: Arc<dyn XpathSuggester>,
        solver: Option<Arc<dyn CaptchaSolver>>,
    ) -> Arc<Self> {
        let workers = config.max_concurrent_scrapes();
        let bus = Arc::new(StatusBus::new(workers));
        Arc::new(Self {
            browser,
            store,
            suggester,
            solver,
            bus,
            worker_permits: Arc::new(Semaphore::new(workers)),
            free_slots: parking_lot::Mutex::new((0..workers).collect()),
            pending: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            config,
        })
    }

    /// Assemble an engine with the production adapters: a launched
    /// Chromium browser, the TOML-backed known-sites store, the
    /// OpenAI-compatible suggester, and whichever captcha backends the
    /// configuration provides credentials for.
    pub async fn bootstrap(config: ScraperConfig) -> anyhow::Result<Arc<Self>> {
        use crate::browser::ChromiumBrowser;
        use crate::captcha::{DataDomeSolver, GenericTokenSolver, SolverConfig, SolverRouter};
        use crate::known_sites::TomlSiteStore;
        use crate::llm::OpenAiSuggester;

        let browser = Arc::new(ChromiumBrowser::launch(&config).await?);
        let store = Arc::new(TomlSiteStore::load(config.known_sites_path()).await?);
        let suggester = Arc::new(OpenAiSuggester::new(&config)?);

        let solver: Option<Arc<dyn CaptchaSolver>> =
            match (config.captcha_endpoint(), config.captcha_api_key()) {
                (Some(endpoint), Some(key)) => {
                    let solver_config = SolverConfig {
                        timeout: config.captcha_timeout(),
                        ..SolverConfig::default()
                    };
                    let router = SolverRouter::new()
                        .with_generic(GenericTokenSolver::new(
                            endpoint,
                            key,
                            solver_config.clone(),
                        )?)
                        .with_datadome(DataDomeSolver::new(endpoint, key, solver_config)?);
                    Some(Arc::new(router))
                }
                _ => None,
            };

        Ok(Self::new(config, browser, store, suggester, solver))
    }

    /// Install a process-wide engine. Fails if one is already installed.
    pub fn init_global(engine: Arc<Self>) -> Result<(), ScrapeError> {
        GLOBAL_ENGINE.set(engine).map_err(|_| {
            ScrapeError::Configuration("Global engine is already initialized".to_string())
        })
    }

    /// The process-wide engine, if one was installed.
    #[must_use]
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL_ENGINE.get().cloned()
    }

    /// The status bus observers subscribe to.
    #[must_use]
    pub fn status_bus(&self) -> Arc<StatusBus> {
        Arc::clone(&self.bus)
    }

    /// Requests currently waiting for a worker.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Execute one scrape to completion.
    pub async fn scrape(&self, request: ScrapeRequest) -> ScrapeResult {
        self.scrape_cancellable(request, std::future::pending()).await
    }

    /// Execute one scrape, aborting when `cancel` resolves: while queued
    /// the request fails immediately; in flight it stops at the next
    /// suspension point and the page is released.
    pub async fn scrape_with_cancel(
        &self,
        request: ScrapeRequest,
        cancel: tokio::sync::oneshot::Receiver<()>,
    ) -> ScrapeResult {
        self.scrape_cancellable(request, async {
            // A dropped sender also counts as cancellation only if the
            // caller chose to drop it; awaiting either way is correct.
            let _ = cancel.await;
        })
        .await
    }

    async fn scrape_cancellable(
        &self,
        request: ScrapeRequest,
        cancel: impl Future<Output = ()>,
    ) -> ScrapeResult {
        let started = Instant::now();
        tokio::pin!(cancel);

        if !self.accepting.load(Ordering::SeqCst) {
            return Err(ScrapeError::Configuration(
                "Engine is shutting down".to_string(),
            ));
        }

        // Admission: run now if a worker is free, otherwise join the
        // bounded FIFO queue.
        let permit = match Arc::clone(&self.worker_permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let waiting = self.pending.fetch_add(1, Ordering::SeqCst);
                if waiting >= self.config.max_queue_size() {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    return Err(ScrapeError::Overloaded(format!(
                        "Queue is full ({} pending requests)",
                        self.config.max_queue_size()
                    )));
                }

                debug!(url = request.url, waiting, "Request queued");
                let acquired = tokio::select! {
                    acquired = Arc::clone(&self.worker_permits).acquire_owned() => acquired,
                    () = &mut cancel => {
                        self.pending.fetch_sub(1, Ordering::SeqCst);
                        return Err(ScrapeError::Configuration(
                            "Request cancelled while queued".to_string(),
                        ));
                    }
                };
                self.pending.fetch_sub(1, Ordering::SeqCst);
                match acquired {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(ScrapeError::Configuration(
                            "Engine is shutting down".to_string(),
                        ));
                    }
                }
            }
        };

        let scrape_id = Uuid::new_v4();
        let Some(worker_id) = self.free_slots.lock().pop_front() else {
            return Err(ScrapeError::Internal(
                "Worker slot accounting out of sync with permits".to_string(),
            ));
        };

        self.bus.scrape_started(worker_id, scrape_id, &request.url);
        debug!(
            %scrape_id,
            worker_id,
            url = request.url,
            context = request.debug_context_id.as_deref().unwrap_or("-"),
            "Scrape started"
        );

        let ctx = ScrapeContext {
            config: &self.config,
            browser: self.browser.as_ref(),
            store: self.store.as_ref(),
            suggester: self.suggester.as_ref(),
            solver: self.solver.as_deref(),
        };

        let deadline = self.config.scrape_timeout();
        let result = tokio::select! {
            outcome = tokio::time::timeout(deadline, execute_scrape(&ctx, &self.browser, &request)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(ScrapeError::Network(format!(
                        "Scrape exceeded its {deadline:?} budget"
                    ))),
                }
            }
            () = &mut cancel => Err(ScrapeError::Configuration(
                "Scrape cancelled by caller".to_string(),
            )),
        };

        self.bus.scrape_ended(worker_id, scrape_id, result.is_ok());
        self.free_slots.lock().push_back(worker_id);
        drop(permit);

        match result {
            Ok(yielded) => {
                info!(%scrape_id, url = request.url, xpath = yielded.xpath, "Scrape succeeded");
                Ok(ScrapeSuccess {
                    method: yielded.method,
                    xpath: yielded.xpath,
                    data: yielded.data,
                    duration: started.elapsed(),
                })
            }
            Err(e) => {
                warn!(%scrape_id, url = request.url, error = %e, "Scrape failed");
                Err(e)
            }
        }
    }

    /// Stop admission, wait for queued and in-flight scrapes to finish,
    /// then close the browser.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        info!("Engine shutdown: draining queue");
        self.accepting.store(false, Ordering::SeqCst);

        let workers = u32::try_from(self.config.max_concurrent_scrapes()).unwrap_or(u32::MAX);
        // Waiters queued before this point are served first (the semaphore
        // is FIFO), so this resolves once the queue has drained.
        let _all = self
            .worker_permits
            .acquire_many(workers)
            .await
            .map_err(|_| anyhow::anyhow!("Worker semaphore closed during shutdown"))?;

        self.worker_permits.close();
        self.browser.shutdown().await?;
        info!("Engine shutdown complete");
        Ok(())
    }
}
