//! Known-sites store: trait, TOML-backed production store, in-memory fake.
//!
//! The production store shadows the on-disk file with a live
//! [`toml_edit::DocumentMut`] and edits records in place, so operator
//! comments and key ordering survive every write byte-for-byte. All
//! mutations are serialized by one async mutex; the in-memory cache is
//! committed only after the file write succeeds, so readers never observe
//! state that is not on disk.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table, value};
use tracing::{debug, warn};

use super::types::SiteConfig;

/// Capability contract for per-domain selector persistence.
///
/// Invariants upheld by every implementation:
/// - at most one record per normalized domain;
/// - `mark_success` leaves the failure counter at exactly 0;
/// - `increment_failure` is a no-op for unknown domains.
#[async_trait]
pub trait KnownSites: Send + Sync {
    /// Fetch the record for a normalized domain.
    async fn get(&self, domain: &str) -> Result<Option<SiteConfig>>;

    /// Insert or replace the record for `config.domain_pattern`.
    async fn put(&self, config: SiteConfig) -> Result<()>;

    /// Zero the failure counter and stamp the success timestamp.
    /// No-op for unknown domains.
    async fn mark_success(&self, domain: &str) -> Result<()>;

    /// Add one to the failure counter. Returns the new counter, or `None`
    /// if the domain has no record.
    async fn increment_failure(&self, domain: &str) -> Result<Option<u32>>;

    /// Remove a record. Returns whether one existed.
    async fn delete(&self, domain: &str) -> Result<bool>;

    /// Snapshot of every record, in file order.
    async fn all(&self) -> Result<Vec<SiteConfig>>;
}

// =============================================================================
// TOML-backed store
// =============================================================================

const SITES_KEY: &str = "sites";

#[derive(Debug)]
struct StoreInner {
    doc: DocumentMut,
    cache: HashMap<String, SiteConfig>,
}

/// File-backed store over a `[[sites]]` array-of-tables document.
#[derive(Debug)]
pub struct TomlSiteStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl TomlSiteStore {
    /// Open the store at `path`, creating an empty document if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// A file that exists but does not parse is a fatal configuration
    /// error; the store never silently resets operator data.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw
                .parse::<DocumentMut>()
                .with_context(|| format!("Known-sites file is corrupted: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Known-sites file absent, starting empty");
                DocumentMut::new()
            }
            Err(e) => {
                return Err(anyhow!(e))
                    .with_context(|| format!("Failed to read known-sites file: {}", path.display()));
            }
        };

        let cache = build_cache(&doc)
            .with_context(|| format!("Known-sites file is corrupted: {}", path.display()))?;

        debug!(
            path = %path.display(),
            records = cache.len(),
            "Loaded known-sites store"
        );

        Ok(Self {
            path,
            inner: Mutex::new(StoreInner { doc, cache }),
        })
    }

    /// The file backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mutate a clone of the document, persist it, and commit the clone
    /// plus cache update only if the write succeeded.
    async fn commit<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut DocumentMut, &mut HashMap<String, SiteConfig>) -> Result<bool>,
    {
        let mut inner = self.inner.lock().await;

        let mut doc = inner.doc.clone();
        let mut cache = inner.cache.clone();
        let changed = mutate(&mut doc, &mut cache)?;
        if !changed {
            return Ok(());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create data directory: {}", parent.display())
            })?;
        }

        tokio::fs::write(&self.path, doc.to_string())
            .await
            .with_context(|| format!("Failed to write known-sites file: {}", self.path.display()))?;

        inner.doc = doc;
        inner.cache = cache;
        Ok(())
    }
}

#[async_trait]
impl KnownSites for TomlSiteStore {
    async fn get(&self, domain: &str) -> Result<Option<SiteConfig>> {
        let inner = self.inner.lock().await;
        Ok(inner.cache.get(domain).cloned())
    }

    async fn put(&self, config: SiteConfig) -> Result<()> {
        if config.xpath_main_content.is_empty() {
            return Err(anyhow!(
                "Refusing to store empty selector for {}",
                config.domain_pattern
            ));
        }

        self.commit(|doc, cache| {
            let sites = sites_mut(doc);
            match find_site_index(sites, &config.domain_pattern) {
                Some(idx) => {
                    let table = sites
                        .get_mut(idx)
                        .ok_or_else(|| anyhow!("Site table vanished during update"))?;
                    write_config_to_table(table, &config);
                }
                None => {
                    let mut table = Table::new();
                    write_config_to_table(&mut table, &config);
                    sites.push(table);
                }
            }
            cache.insert(config.domain_pattern.clone(), config);
            Ok(true)
        })
        .await
    }

    async fn mark_success(&self, domain: &str) -> Result<()> {
        let now = Utc::now();
        self.commit(|doc, cache| {
            let Some(record) = cache.get_mut(domain) else {
                return Ok(false);
            };
            record.failure_count_since_last_success = 0;
            record.last_successful_scrape = Some(now);

            let sites = sites_mut(doc);
            if let Some(idx) = find_site_index(sites, domain)
                && let Some(table) = sites.get_mut(idx)
            {
                table["failure_count_since_last_success"] = value(0_i64);
                table["last_successful_scrape"] =
                    value(now.to_rfc3339_opts(SecondsFormat::Secs, true));
            }
            Ok(true)
        })
        .await
    }

    async fn increment_failure(&self, domain: &str) -> Result<Option<u32>> {
        let mut new_count = None;
        self.commit(|doc, cache| {
            let Some(record) = cache.get_mut(domain) else {
                return Ok(false);
            };
            record.failure_count_since_last_success =
                record.failure_count_since_last_success.saturating_add(1);
            new_count = Some(record.failure_count_since_last_success);

            let sites = sites_mut(doc);
            if let Some(idx) = find_site_index(sites, domain)
                && let Some(table) = sites.get_mut(idx)
            {
                table["failure_count_since_last_success"] =
                    value(i64::from(record.failure_count_since_last_success));
            }
            Ok(true)
        })
        .await?;
        Ok(new_count)
    }

    async fn delete(&self, domain: &str) -> Result<bool> {
        let mut existed = false;
        self.commit(|doc, cache| {
            let sites = sites_mut(doc);
            if let Some(idx) = find_site_index(sites, domain) {
                sites.remove(idx);
                cache.remove(domain);
                existed = true;
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .await?;
        Ok(existed)
    }

    async fn all(&self) -> Result<Vec<SiteConfig>> {
        let inner = self.inner.lock().await;
        // File order, not cache order
        let Some(sites) = inner.doc.get(SITES_KEY).and_then(Item::as_array_of_tables) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(sites.len());
        for table in sites.iter() {
            if let Some(domain) = table.get("domain_pattern").and_then(Item::as_str)
                && let Some(record) = inner.cache.get(domain)
            {
                out.push(record.clone());
            }
        }
        Ok(out)
    }
}

fn sites_mut(doc: &mut DocumentMut) -> &mut ArrayOfTables {
    if !doc.contains_key(SITES_KEY) {
        doc.insert(SITES_KEY, Item::ArrayOfTables(ArrayOfTables::new()));
    }
    doc[SITES_KEY]
        .as_array_of_tables_mut()
        .expect("sites key is an array of tables")
}

fn find_site_index(sites: &ArrayOfTables, domain: &str) -> Option<usize> {
    sites
        .iter()
        .position(|t| t.get("domain_pattern").and_then(Item::as_str) == Some(domain))
}

/// Set every field of `config` on the table, removing keys whose value is
/// absent. Existing key decor (comments) is preserved by in-place updates.
fn write_config_to_table(table: &mut Table, config: &SiteConfig) {
    table["domain_pattern"] = value(config.domain_pattern.as_str());
    table["xpath_main_content"] = value(config.xpath_main_content.as_str());

    match config.last_successful_scrape {
        Some(ts) => {
            table["last_successful_scrape"] =
                value(ts.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        None => {
            table.remove("last_successful_scrape");
        }
    }

    table["failure_count_since_last_success"] =
        value(i64::from(config.failure_count_since_last_success));
    table["discovered_by_llm"] = value(config.discovered_by_llm);

    match &config.site_specific_headers {
        Some(headers) => {
            let mut inline = InlineTable::new();
            for (k, v) in headers {
                inline.insert(k, v.as_str().into());
            }
            table["site_specific_headers"] = value(inline);
        }
        None => {
            table.remove("site_specific_headers");
        }
    }

    match &config.site_cleanup_classes {
        Some(classes) => {
            let mut arr = Array::new();
            for class in classes {
                arr.push(class.as_str());
            }
            table["site_cleanup_classes"] = value(arr);
        }
        None => {
            table.remove("site_cleanup_classes");
        }
    }

    match &config.user_agent_override {
        Some(ua) => {
            table["user_agent_override"] = value(ua.as_str());
        }
        None => {
            table.remove("user_agent_override");
        }
    }
}

fn build_cache(doc: &DocumentMut) -> Result<HashMap<String, SiteConfig>> {
    let mut cache = HashMap::new();
    let Some(item) = doc.get(SITES_KEY) else {
        return Ok(cache);
    };
    // Anything but [[sites]] tables is a malformed file, not an empty one;
    // validating here keeps every later document edit infallible.
    let sites = item
        .as_array_of_tables()
        .ok_or_else(|| anyhow!("'{SITES_KEY}' must be an array of tables"))?;

    for (idx, table) in sites.iter().enumerate() {
        let config = read_config_from_table(table)
            .with_context(|| format!("Invalid site record at index {idx}"))?;
        if cache
            .insert(config.domain_pattern.clone(), config)
            .is_some()
        {
            let domain = sites
                .get(idx)
                .and_then(|t| t.get("domain_pattern"))
                .and_then(Item::as_str)
                .unwrap_or("<unknown>");
            return Err(anyhow!("Duplicate site record for domain '{domain}'"));
        }
    }

    Ok(cache)
}

fn read_config_from_table(table: &Table) -> Result<SiteConfig> {
    let domain_pattern = table
        .get("domain_pattern")
        .and_then(Item::as_str)
        .ok_or_else(|| anyhow!("Missing 'domain_pattern'"))?
        .to_string();

    let xpath_main_content = table
        .get("xpath_main_content")
        .and_then(Item::as_str)
        .ok_or_else(|| anyhow!("Missing 'xpath_main_content'"))?
        .to_string();
    if xpath_main_content.is_empty() {
        return Err(anyhow!("Empty 'xpath_main_content' for '{domain_pattern}'"));
    }

    let last_successful_scrape = match table.get("last_successful_scrape").and_then(Item::as_str) {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("Bad timestamp '{raw}' for '{domain_pattern}'"))?,
        ),
        None => None,
    };

    let failure_count_since_last_success = table
        .get("failure_count_since_last_success")
        .and_then(Item::as_integer)
        .map_or(Ok(0), |n| {
            u32::try_from(n)
                .map_err(|_| anyhow!("Negative failure count for '{domain_pattern}'"))
        })?;

    let discovered_by_llm = table
        .get("discovered_by_llm")
        .and_then(Item::as_bool)
        .unwrap_or(false);

    let site_specific_headers = table
        .get("site_specific_headers")
        .and_then(Item::as_inline_table)
        .map(|inline| {
            inline
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.to_string(), s.to_string())))
                .collect::<BTreeMap<_, _>>()
        });

    let site_cleanup_classes = table
        .get("site_cleanup_classes")
        .and_then(Item::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect::<Vec<_>>()
        });

    let user_agent_override = table
        .get("user_agent_override")
        .and_then(Item::as_str)
        .map(str::to_string);

    Ok(SiteConfig {
        domain_pattern,
        xpath_main_content,
        last_successful_scrape,
        failure_count_since_last_success,
        discovered_by_llm,
        site_specific_headers,
        site_cleanup_classes,
        user_agent_override,
    })
}

// =============================================================================
// In-memory fake
// =============================================================================

/// Volatile store for tests and embedded callers that opt out of
/// persistence. Same invariants as [`TomlSiteStore`], no file.
#[derive(Default)]
pub struct MemorySiteStore {
    records: Mutex<Vec<SiteConfig>>,
}

impl MemorySiteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records (tests).
    pub async fn seed(&self, configs: impl IntoIterator<Item = SiteConfig>) {
        let mut records = self.records.lock().await;
        for config in configs {
            if let Some(existing) = records
                .iter_mut()
                .find(|r| r.domain_pattern == config.domain_pattern)
            {
                *existing = config;
            } else {
                records.push(config);
            }
        }
    }
}

#[async_trait]
impl KnownSites for MemorySiteStore {
    async fn get(&self, domain: &str) -> Result<Option<SiteConfig>> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| r.domain_pattern == domain).cloned())
    }

    async fn put(&self, config: SiteConfig) -> Result<()> {
        if config.xpath_main_content.is_empty() {
            return Err(anyhow!(
                "Refusing to store empty selector for {}",
                config.domain_pattern
            ));
        }
        let mut records = self.records.lock().await;
        if let Some(existing) = records
            .iter_mut()
            .find(|r| r.domain_pattern == config.domain_pattern)
        {
            *existing = config;
        } else {
            records.push(config);
        }
        Ok(())
    }

    async fn mark_success(&self, domain: &str) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.iter_mut().find(|r| r.domain_pattern == domain) {
            record.failure_count_since_last_success = 0;
            record.last_successful_scrape = Some(Utc::now());
        } else {
            warn!(domain, "mark_success for unknown domain, ignoring");
        }
        Ok(())
    }

    async fn increment_failure(&self, domain: &str) -> Result<Option<u32>> {
        let mut records = self.records.lock().await;
        Ok(records
            .iter_mut()
            .find(|r| r.domain_pattern == domain)
            .map(|record| {
                record.failure_count_since_last_success =
                    record.failure_count_since_last_success.saturating_add(1);
                record.failure_count_since_last_success
            }))
    }

    async fn delete(&self, domain: &str) -> Result<bool> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|r| r.domain_pattern != domain);
        Ok(records.len() != before)
    }

    async fn all(&self) -> Result<Vec<SiteConfig>> {
        Ok(self.records.lock().await.clone())
    }
}
