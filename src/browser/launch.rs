//! Browser process discovery and launch.
//!
//! Finds a Chrome/Chromium binary on the host (or uses the configured one),
//! launches it with a stealth argument set into a throwaway profile, and
//! hands back the browser plus the CDP handler task. The handler MUST be
//! aborted when the browser is done or it outlives the Chrome process.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::{self, JoinHandle};
use tracing::info;

use crate::config::ScraperConfig;

/// Default user agent sent when neither config nor site override one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Find a Chrome/Chromium executable using platform-specific search paths.
///
/// # Errors
///
/// Fails when no binary exists at any known location and `which` finds
/// nothing either.
pub fn find_browser_executable() -> Result<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser using 'which': {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    Err(anyhow::anyhow!(
        "Chrome/Chromium executable not found; set SMARTSCRAPER_BROWSER_EXECUTABLE"
    ))
}

/// Launch a browser for scraping per the engine configuration.
///
/// Returns the browser, the spawned CDP handler task and the temp profile
/// directory (deleted when the `TempDir` drops).
pub async fn launch_scraper_browser(
    config: &ScraperConfig,
) -> Result<(Browser, JoinHandle<()>, TempDir)> {
    let executable = match config.browser_executable() {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Configured browser executable does not exist: {}",
                    path.display()
                ));
            }
            path.to_path_buf()
        }
        None => find_browser_executable()?,
    };

    let profile_dir = TempDir::with_prefix("smartscraper_profile_")
        .context("Failed to create browser profile directory")?;

    let user_agent = config.user_agent().unwrap_or(DEFAULT_USER_AGENT);

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(profile_dir.path())
        .chrome_executable(executable)
        .headless_mode(if config.headless() {
            HeadlessMode::default()
        } else {
            HeadlessMode::False
        })
        .arg(format!("--user-agent={user_agent}"))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-ipc-flooding-protection")
        .arg("--disable-prompt-on-repost")
        .arg("--disable-popup-blocking")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    if let Some(proxy) = config.proxy() {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }

    if !config.extension_dirs().is_empty() {
        let joined = config
            .extension_dirs()
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        builder = builder.arg(format!("--load-extension={joined}"));
    }

    let browser_config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("Failed to launch browser")?;

    // Drive the CDP connection; tracked so shutdown can abort it.
    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::error!("Browser handler error: {:?}", e);
            }
        }
        info!("Browser event handler task completed");
    });

    Ok((browser, handler_task, profile_dir))
}
