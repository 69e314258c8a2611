//! TOML-backed known-sites store: round-trips, invariants, failure modes.

use smartscraper::{KnownSites, SiteConfig, TomlSiteStore};
use std::collections::BTreeMap;

const ANNOTATED_FILE: &str = r#"# Curated extraction rules. Hand edits welcome.

# news
[[sites]]
# learned 2026-02, works well
domain_pattern = "example.com"
xpath_main_content = "//article"
last_successful_scrape = "2026-02-05T10:30:00Z"
failure_count_since_last_success = 0
discovered_by_llm = true
site_cleanup_classes = ["ad-wrapper"]

# blogs
[[sites]]
domain_pattern = "blog.example.org"
xpath_main_content = "//main//div[@class='post']"
failure_count_since_last_success = 1
discovered_by_llm = false
"#;

async fn store_with(content: &str) -> (tempfile::TempDir, TomlSiteStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_sites.toml");
    tokio::fs::write(&path, content).await.unwrap();
    let store = TomlSiteStore::load(&path).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn loads_annotated_file() {
    let (_dir, store) = store_with(ANNOTATED_FILE).await;

    let site = store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.xpath_main_content, "//article");
    assert!(site.discovered_by_llm);
    assert_eq!(
        site.site_cleanup_classes.as_deref(),
        Some(&["ad-wrapper".to_string()][..])
    );
    assert!(site.last_successful_scrape.is_some());

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].domain_pattern, "example.com");
    assert_eq!(all[1].domain_pattern, "blog.example.org");
}

#[tokio::test]
async fn rewriting_an_unchanged_record_preserves_every_comment_byte() {
    let (dir, store) = store_with(ANNOTATED_FILE).await;
    let path = dir.path().join("known_sites.toml");

    // Put back exactly what is stored: semantically a no-op.
    let site = store.get("example.com").await.unwrap().unwrap();
    store.put(site).await.unwrap();

    let after = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(after, ANNOTATED_FILE);
}

#[tokio::test]
async fn mutations_keep_comments_in_place() {
    let (dir, store) = store_with(ANNOTATED_FILE).await;
    let path = dir.path().join("known_sites.toml");

    store.increment_failure("example.com").await.unwrap();
    store.mark_success("blog.example.org").await.unwrap();

    let after = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(after.contains("# Curated extraction rules. Hand edits welcome."));
    assert!(after.contains("# news"));
    assert!(after.contains("# learned 2026-02, works well"));
    assert!(after.contains("# blogs"));
    assert!(after.contains("failure_count_since_last_success = 1"));
}

#[tokio::test]
async fn failure_counter_is_additive_and_success_zeroes_it() {
    let (_dir, store) = store_with(ANNOTATED_FILE).await;

    assert_eq!(
        store.increment_failure("example.com").await.unwrap(),
        Some(1)
    );
    assert_eq!(
        store.increment_failure("example.com").await.unwrap(),
        Some(2)
    );
    assert_eq!(
        store.increment_failure("example.com").await.unwrap(),
        Some(3)
    );

    store.mark_success("example.com").await.unwrap();
    let site = store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.failure_count_since_last_success, 0);
    let first_stamp = site.last_successful_scrape;

    // Idempotent with respect to observable state.
    store.mark_success("example.com").await.unwrap();
    let site = store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.failure_count_since_last_success, 0);
    assert!(site.last_successful_scrape >= first_stamp);
}

#[tokio::test]
async fn unknown_domain_mutations_are_noops() {
    let (_dir, store) = store_with(ANNOTATED_FILE).await;

    assert_eq!(store.increment_failure("nowhere.test").await.unwrap(), None);
    store.mark_success("nowhere.test").await.unwrap();
    assert!(store.get("nowhere.test").await.unwrap().is_none());
    assert_eq!(store.all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn put_upserts_without_duplicating_domains() {
    let (_dir, store) = store_with(ANNOTATED_FILE).await;

    let mut headers = BTreeMap::new();
    headers.insert("Accept-Language".to_string(), "en".to_string());

    let mut updated = store.get("example.com").await.unwrap().unwrap();
    updated.xpath_main_content = "//main".to_string();
    updated.site_specific_headers = Some(headers);
    store.put(updated).await.unwrap();

    let all = store.all().await.unwrap();
    assert_eq!(all.len(), 2, "put must not create a second record");
    let site = store.get("example.com").await.unwrap().unwrap();
    assert_eq!(site.xpath_main_content, "//main");
    assert!(site.site_specific_headers.is_some());
}

#[tokio::test]
async fn delete_removes_the_record_and_its_table() {
    let (dir, store) = store_with(ANNOTATED_FILE).await;
    let path = dir.path().join("known_sites.toml");

    assert!(store.delete("blog.example.org").await.unwrap());
    assert!(!store.delete("blog.example.org").await.unwrap());
    assert!(store.get("blog.example.org").await.unwrap().is_none());

    let after = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(!after.contains("blog.example.org"));
    // The other record and the header comment survive.
    assert!(after.contains("example.com"));
    assert!(after.contains("# Curated extraction rules."));
}

#[tokio::test]
async fn missing_file_starts_empty_and_persists_on_first_put() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh").join("known_sites.toml");

    let store = TomlSiteStore::load(&path).await.unwrap();
    assert!(store.all().await.unwrap().is_empty());

    store
        .put(SiteConfig::discovered("example.net", "//article"))
        .await
        .unwrap();

    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(raw.contains("domain_pattern = \"example.net\""));
    assert!(raw.contains("xpath_main_content = \"//article\""));
    assert!(raw.contains("discovered_by_llm = true"));
}

#[tokio::test]
async fn corrupted_file_is_a_fatal_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_sites.toml");
    tokio::fs::write(&path, "[[sites]\ndomain_pattern = broken")
        .await
        .unwrap();

    let err = TomlSiteStore::load(&path).await.unwrap_err();
    assert!(format!("{err:#}").contains("corrupted"));
}

#[tokio::test]
async fn duplicate_domains_are_rejected_at_load() {
    let duplicated = r#"
[[sites]]
domain_pattern = "example.com"
xpath_main_content = "//a"

[[sites]]
domain_pattern = "example.com"
xpath_main_content = "//b"
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("known_sites.toml");
    tokio::fs::write(&path, duplicated).await.unwrap();

    assert!(TomlSiteStore::load(&path).await.is_err());
}

#[tokio::test]
async fn empty_selector_is_refused() {
    let (_dir, store) = store_with(ANNOTATED_FILE).await;
    let mut bad = store.get("example.com").await.unwrap().unwrap();
    bad.xpath_main_content = String::new();
    assert!(store.put(bad).await.is_err());
}
