//! UTF-8-safe string truncation.
//!
//! Text destined for the language model is cut aggressively; these helpers
//! respect character boundaries so multi-byte text never panics a slice.

/// Truncate a string to at most `max_chars` characters (not bytes).
///
/// Returns a slice of the original string; never allocates and never
/// panics on multi-byte characters.
#[inline]
#[must_use]
pub fn safe_truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        None => s,
        Some((byte_idx, _)) => &s[..byte_idx],
    }
}

/// Truncate to at most `max_chars` characters, preferring to break at a
/// word boundary (whitespace) within the window.
///
/// Falls back to a hard character cut when the window contains no
/// whitespace at all. Trailing whitespace is trimmed from the result.
#[must_use]
pub fn safe_truncate_boundary(s: &str, max_chars: usize) -> &str {
    let hard = safe_truncate_chars(s, max_chars);
    if hard.len() == s.len() {
        return s;
    }

    match hard.rfind(char::is_whitespace) {
        Some(idx) => hard[..idx].trim_end(),
        None => hard,
    }
}
