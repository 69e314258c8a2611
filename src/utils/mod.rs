//! Shared helpers for URL handling and text truncation.

pub mod string_utils;
pub mod url_utils;

pub use string_utils::{safe_truncate_boundary, safe_truncate_chars};
pub use url_utils::{is_valid_scrape_url, normalize_domain};
