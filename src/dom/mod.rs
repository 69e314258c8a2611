//! LLM input preparation: DOM simplification and text snippet extraction.
//!
//! The language model never sees raw page HTML. It gets a compact skeleton
//! of the document (tags, ids, classes, landmarks) plus a handful of text
//! exemplars from the article body, both hard-capped in size.

pub mod simplifier;
pub mod snippets;

pub use simplifier::{MAX_INPUT_HTML_BYTES, MAX_SIMPLIFIED_CHARS, simplify_dom};
pub use snippets::extract_snippets;

/// Class-name fragments treated as non-content chrome everywhere in the
/// crate: the simplifier drops these subtrees and the snippet extractor
/// refuses exemplars from inside them.
pub const DEFAULT_UNWANTED_CLASS_FRAGMENTS: &[&str] = &[
    "ad",
    "advertisement",
    "social-share",
    "related-posts",
    "sidebar",
    "menu",
    "nav",
    "comment",
];

/// Whether a `class` attribute matches an unwanted fragment.
///
/// Matching is done per class token, on `-`/`_` separated words, so the
/// fragment `ad` flags `ad-wrapper`, `ads` and `sponsor_ad` but not
/// `header` or `shadow`. Multi-word fragments (`social-share`) match as
/// whole-token substrings.
#[must_use]
pub fn class_matches_unwanted(class_attr: &str, extra_fragments: &[String]) -> bool {
    class_attr.split_ascii_whitespace().any(|token| {
        let token = token.to_ascii_lowercase();
        DEFAULT_UNWANTED_CLASS_FRAGMENTS
            .iter()
            .copied()
            .chain(extra_fragments.iter().map(String::as_str))
            .any(|fragment| token_matches_fragment(&token, &fragment.to_ascii_lowercase()))
    })
}

fn token_matches_fragment(token: &str, fragment: &str) -> bool {
    if fragment.contains('-') || fragment.contains('_') {
        return token.contains(fragment);
    }
    // Prefix match per word so plurals ("ads", "comments") are caught.
    token
        .split(['-', '_'])
        .any(|word| word.starts_with(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_word_fragments_match_word_prefixes_only() {
        assert!(class_matches_unwanted("ad-wrapper", &[]));
        assert!(class_matches_unwanted("ads", &[]));
        assert!(class_matches_unwanted("sponsor_ad", &[]));
        assert!(class_matches_unwanted("sidebar", &[]));
        assert!(class_matches_unwanted("comments-section", &[]));
        assert!(!class_matches_unwanted("header", &[]));
        assert!(!class_matches_unwanted("shadow", &[]));
    }

    #[test]
    fn multi_word_fragments_match_as_substrings() {
        assert!(class_matches_unwanted("social-share-bar", &[]));
        assert!(class_matches_unwanted("related-posts", &[]));
    }

    #[test]
    fn per_site_fragments_extend_the_set() {
        let extra = vec!["promo".to_string()];
        assert!(class_matches_unwanted("promo-box", &extra));
        assert!(!class_matches_unwanted("promo-box", &[]));
    }
}
