//! End-to-end engine scenarios over the in-memory fakes.

use smartscraper::{
    CaptchaKind, CaptchaObservation, ErrorKind, FakeBrowser, FakeSolver, FakeSuggester,
    KnownSites, MemorySiteStore, ScrapeEngine, ScrapeMethod, ScrapeRequest, ScraperConfig,
    ScraperConfigBuilder, SiteConfig, WorkerStatusEvent,
};
use smartscraper::browser::{FakeSite, XpathFixture};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const URL: &str = "https://example.com/a";

fn test_config() -> ScraperConfig {
    ScraperConfigBuilder::new()
        .navigation_timeout_secs(17)
        .build()
        .expect("test config builds")
}

struct Harness {
    browser: Arc<FakeBrowser>,
    store: Arc<MemorySiteStore>,
    suggester: Arc<FakeSuggester>,
    solver: Arc<FakeSolver>,
}

impl Harness {
    fn new() -> Self {
        Self {
            browser: Arc::new(FakeBrowser::new()),
            store: Arc::new(MemorySiteStore::new()),
            suggester: Arc::new(FakeSuggester::new()),
            solver: Arc::new(FakeSolver::solving_with_cookie("datadome=solved")),
        }
    }

    fn engine(&self, config: ScraperConfig) -> Arc<ScrapeEngine> {
        ScrapeEngine::new(
            config,
            self.browser.clone(),
            self.store.clone(),
            self.suggester.clone(),
            Some(self.solver.clone()),
        )
    }
}

fn stored_article_config() -> SiteConfig {
    SiteConfig {
        domain_pattern: "example.com".to_string(),
        xpath_main_content: "//article".to_string(),
        last_successful_scrape: None,
        failure_count_since_last_success: 0,
        discovered_by_llm: false,
        site_specific_headers: None,
        site_cleanup_classes: None,
        user_agent_override: None,
    }
}

#[tokio::test]
async fn known_good_fast_path() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness.browser.register(
        URL,
        FakeSite::new("<html><body><article><p>…</p></article></body></html>")
            .with_xpath("//article", XpathFixture::article(12, 3000, 1)),
    );

    let engine = harness.engine(test_config());
    let result = engine.scrape(ScrapeRequest::new(URL)).await.unwrap();

    assert_eq!(result.method, ScrapeMethod::KnownConfig);
    assert_eq!(result.xpath, "//article");
    assert_eq!(result.data.chars().count(), 3000);

    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.failure_count_since_last_success, 0);
    assert!(site.last_successful_scrape.is_some());
    assert_eq!(harness.browser.open_page_count(), 0);
}

#[tokio::test]
async fn stale_selector_triggers_rediscovery() {
    let harness = Harness::new();
    let mut stale = stored_article_config();
    stale.xpath_main_content = "//div[@id='old']".to_string();
    stale.failure_count_since_last_success = 1;
    harness.store.seed([stale]).await;

    // #old no longer exists; the model proposes two selectors, one works.
    harness.browser.register(
        URL,
        FakeSite::new("<html><body><article><p>story</p></article></body></html>")
            .with_xpath("//article", XpathFixture::article(10, 2600, 1)),
    );
    harness.suggester.push_reply(["//article", "//main"]);

    let engine = harness.engine(test_config());
    let result = engine.scrape(ScrapeRequest::new(URL)).await.unwrap();

    assert_eq!(result.method, ScrapeMethod::Discovered);
    assert_eq!(result.xpath, "//article");

    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.xpath_main_content, "//article");
    assert_eq!(site.failure_count_since_last_success, 0);
    assert!(site.discovered_by_llm);
    assert_eq!(harness.browser.open_page_count(), 0);
}

#[tokio::test]
async fn stale_selector_below_threshold_reports_extraction() {
    let harness = Harness::new();
    let mut stale = stored_article_config();
    stale.xpath_main_content = "//div[@id='old']".to_string();
    harness.store.seed([stale]).await;
    harness
        .browser
        .register(URL, FakeSite::new("<html><body></body></html>"));

    let engine = harness.engine(test_config());
    let err = engine.scrape(ScrapeRequest::new(URL)).await.unwrap_err();

    // First failure: counter 0 → 1, still below the threshold of 2.
    assert_eq!(err.kind(), ErrorKind::Extraction);
    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.failure_count_since_last_success, 1);
    assert_eq!(site.xpath_main_content, "//div[@id='old']");
    // No LLM call was made.
    assert!(harness.suggester.calls().is_empty());
}

#[tokio::test]
async fn cold_start_discovery_after_one_retry() {
    let harness = Harness::new();
    harness.browser.register(
        URL,
        FakeSite::new("<html><body><article id=\"main\"><p>story</p></article></body></html>")
            .with_xpath("//div[@class='nav']", XpathFixture::article(1, 90, 1))
            .with_xpath("//article[@id='main']", XpathFixture::article(9, 2400, 1)),
    );
    harness.suggester.push_reply(["//div[@class='nav']"]);
    harness.suggester.push_reply(["//article[@id='main']"]);

    let engine = harness.engine(test_config());
    let result = engine.scrape(ScrapeRequest::new(URL)).await.unwrap();

    assert_eq!(result.method, ScrapeMethod::Discovered);
    assert_eq!(result.xpath, "//article[@id='main']");

    let calls = harness.suggester.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].feedback.iter().any(|entry| {
        entry.xpath == "//div[@class='nav']" && entry.reason.contains("too few paragraphs")
    }));

    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.xpath_main_content, "//article[@id='main']");
    assert!(site.discovered_by_llm);
}

#[tokio::test]
async fn captcha_solved_then_success() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;

    let challenge = CaptchaObservation {
        kind: CaptchaKind::DataDome,
        site_key: None,
        iframe_url: Some("https://geo.captcha-delivery.com/captcha/?cid=9".to_string()),
    };
    harness.browser.register(
        URL,
        FakeSite::new("<html><body>challenge</body></html>")
            .with_captcha_sequence(vec![challenge])
            .with_xpath("//article", XpathFixture::article(8, 1500, 1)),
    );

    let engine = harness.engine(test_config());
    let result = engine.scrape(ScrapeRequest::new(URL)).await.unwrap();

    assert_eq!(result.method, ScrapeMethod::KnownConfig);
    assert_eq!(result.data.chars().count(), 1500);
    assert_eq!(harness.solver.call_count(), 1);

    // Exactly one reload, with the request-derived timeout.
    let reloads = harness.browser.reload_log();
    assert_eq!(reloads.len(), 1);
    assert_eq!(reloads[0].1, Duration::from_secs(17));

    let cookies = harness.browser.cookie_log();
    assert_eq!(cookies.len(), 1);
    assert_eq!(cookies[0].1.name, "datadome");
    assert_eq!(cookies[0].1.value, "solved");
    assert_eq!(harness.browser.open_page_count(), 0);
}

#[tokio::test]
async fn unsolved_captcha_is_a_captcha_failure() {
    let harness = Harness::new();
    let browser = Arc::new(FakeBrowser::new());
    browser.register(
        URL,
        FakeSite::new("challenge").with_captcha_sequence(vec![
            CaptchaObservation {
                kind: CaptchaKind::DataDome,
                site_key: None,
                iframe_url: None,
            },
        ]),
    );
    let engine = ScrapeEngine::new(
        test_config(),
        browser.clone(),
        harness.store.clone(),
        harness.suggester.clone(),
        Some(Arc::new(FakeSolver::failing("slider rejected"))),
    );

    let err = engine.scrape(ScrapeRequest::new(URL)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Captcha);
    assert_eq!(browser.open_page_count(), 0);
}

#[tokio::test]
async fn queue_overload_rejects_exactly_past_the_bound() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness.browser.register(
        URL,
        FakeSite::new("<html/>")
            .with_xpath("//article", XpathFixture::article(10, 2000, 1))
            .with_load_delay(Duration::from_millis(150)),
    );

    let config = ScraperConfigBuilder::new()
        .max_concurrent_scrapes(1)
        .max_queue_size(2)
        .build()
        .unwrap();
    let engine = harness.engine(config);

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });
    // Let A occupy the single worker before B/C/D arrive.
    tokio::time::sleep(Duration::from_millis(30)).await;

    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });
    let c = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Queue holds B and C; D must bounce immediately.
    let started = std::time::Instant::now();
    let d = engine.scrape(ScrapeRequest::new(URL)).await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(d.unwrap_err().kind(), ErrorKind::Overloaded);

    assert!(a.await.unwrap().is_ok());
    assert!(b.await.unwrap().is_ok());
    assert!(c.await.unwrap().is_ok());
    assert_eq!(harness.browser.open_page_count(), 0);
}

#[tokio::test]
async fn override_bypasses_store_in_both_directions() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness.browser.register(
        URL,
        FakeSite::new("<html/>")
            .with_xpath("//article", XpathFixture::article(12, 3000, 1))
            .with_xpath("//section[@id='x']", XpathFixture::article(6, 800, 1)),
    );

    let engine = harness.engine(test_config());

    // Success: method=override, store untouched.
    let result = engine
        .scrape(ScrapeRequest::new(URL).with_xpath_override("//section[@id='x']"))
        .await
        .unwrap();
    assert_eq!(result.method, ScrapeMethod::Override);
    assert_eq!(result.xpath, "//section[@id='x']");

    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.xpath_main_content, "//article");
    assert!(site.last_successful_scrape.is_none());
    assert_eq!(site.failure_count_since_last_success, 0);

    // Failure: extraction, store still untouched, no discovery.
    let err = engine
        .scrape(ScrapeRequest::new(URL).with_xpath_override("//nope"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Extraction);
    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.failure_count_since_last_success, 0);
    assert!(harness.suggester.calls().is_empty());
}

#[tokio::test]
async fn disable_discovery_without_config_is_extraction() {
    let harness = Harness::new();
    harness.browser.register(URL, FakeSite::new("<html/>"));

    let engine = harness.engine(test_config());
    let err = engine
        .scrape(ScrapeRequest::new(URL).with_disable_discovery(true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Extraction);
    assert!(harness.suggester.calls().is_empty());
}

#[tokio::test]
async fn invalid_url_is_configuration_not_panic() {
    let harness = Harness::new();
    let engine = harness.engine(test_config());

    for bad in ["", "not a url", "javascript:alert(1)", "ftp://example.com/x"] {
        let err = engine.scrape(ScrapeRequest::new(bad)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "for input {bad:?}");
    }
}

#[tokio::test]
async fn navigation_failure_increments_known_site_counter() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness
        .browser
        .register(URL, FakeSite::new("").failing_navigation());

    let engine = harness.engine(test_config());
    let err = engine.scrape(ScrapeRequest::new(URL)).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
    let site = harness.store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.failure_count_since_last_success, 1);
}

#[tokio::test]
async fn concurrent_same_url_scrapes_get_distinct_ids() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness.browser.register(
        URL,
        FakeSite::new("<html/>")
            .with_xpath("//article", XpathFixture::article(10, 2000, 1))
            .with_load_delay(Duration::from_millis(80)),
    );

    let config = ScraperConfigBuilder::new()
        .max_concurrent_scrapes(2)
        .build()
        .unwrap();
    let engine = harness.engine(config);
    let mut events = engine.status_bus().subscribe();

    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());

    // Both started before either ended (they really ran concurrently),
    // and the scrape ids are distinct.
    let mut started_ids = HashSet::new();
    let mut ended_before_both_started = false;
    for _ in 0..2 {
        match events.try_recv().unwrap() {
            WorkerStatusEvent::ScrapeStarted { scrape_id, .. } => {
                started_ids.insert(scrape_id);
            }
            WorkerStatusEvent::ScrapeEnded { .. } => ended_before_both_started = true,
        }
    }
    assert!(!ended_before_both_started);
    assert_eq!(started_ids.len(), 2);

    for _ in 0..2 {
        match events.try_recv().unwrap() {
            WorkerStatusEvent::ScrapeEnded { success, scrape_id, .. } => {
                assert!(success);
                assert!(started_ids.contains(&scrape_id));
            }
            WorkerStatusEvent::ScrapeStarted { .. } => panic!("unexpected third start"),
        }
    }
}

#[tokio::test]
async fn queued_request_can_be_cancelled() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness.browser.register(
        URL,
        FakeSite::new("<html/>")
            .with_xpath("//article", XpathFixture::article(10, 2000, 1))
            .with_load_delay(Duration::from_millis(150)),
    );

    let config = ScraperConfigBuilder::new()
        .max_concurrent_scrapes(1)
        .build()
        .unwrap();
    let engine = harness.engine(config);

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });
    tokio::time::sleep(Duration::from_millis(30)).await;

    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
    let queued = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .scrape_with_cancel(ScrapeRequest::new(URL), cancel_rx)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    cancel_tx.send(()).unwrap();
    let err = queued.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    assert!(running.await.unwrap().is_ok());
    assert_eq!(harness.browser.open_page_count(), 0);
}

#[tokio::test]
async fn shutdown_drains_and_rejects_new_work() {
    let harness = Harness::new();
    harness.store.seed([stored_article_config()]).await;
    harness.browser.register(
        URL,
        FakeSite::new("<html/>")
            .with_xpath("//article", XpathFixture::article(10, 2000, 1))
            .with_load_delay(Duration::from_millis(80)),
    );

    let engine = harness.engine(test_config());
    let in_flight = tokio::spawn({
        let engine = engine.clone();
        async move { engine.scrape(ScrapeRequest::new(URL)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.shutdown().await.unwrap();

    // The in-flight scrape completed rather than being dropped.
    assert!(in_flight.await.unwrap().is_ok());
    // New work is refused.
    let err = engine.scrape(ScrapeRequest::new(URL)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(harness.browser.open_page_count(), 0);
}
