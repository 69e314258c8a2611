//! Text exemplars for the LLM prompt.
//!
//! A few real sentences from the article body anchor the model: the
//! selector it proposes should contain this text. Exemplars come from
//! text-bearing tags outside the unwanted chrome, are deduplicated, and
//! are cut at a word boundary.

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

use super::class_matches_unwanted;
use crate::utils::safe_truncate_boundary;

/// Number of exemplars collected.
const MAX_SNIPPETS: usize = 3;

/// Minimum text length (characters) for an exemplar.
const MIN_SNIPPET_CHARS: usize = 100;

/// Exemplars are cut to roughly this many characters at a word boundary.
const SNIPPET_TRUNCATE_CHARS: usize = 150;

static TEXT_BEARING: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("p, h2, h3, li, blockquote")
        .expect("hardcoded CSS selector for text-bearing tags is valid")
});

/// Extract up to three unique text exemplars from `html`.
///
/// Elements with an unwanted-class ancestor are skipped; an empty result
/// is valid (pages with no long-form text).
#[must_use]
pub fn extract_snippets(html: &str, extra_cleanup_classes: &[String]) -> Vec<String> {
    let document = Html::parse_document(html);

    let mut seen = HashSet::new();
    let mut snippets = Vec::with_capacity(MAX_SNIPPETS);

    for element in document.select(&TEXT_BEARING) {
        if snippets.len() >= MAX_SNIPPETS {
            break;
        }

        if has_unwanted_ancestor(element, extra_cleanup_classes) {
            continue;
        }

        let text = element
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if text.chars().count() < MIN_SNIPPET_CHARS {
            continue;
        }
        if !seen.insert(text.clone()) {
            continue;
        }

        let cut = safe_truncate_boundary(&text, SNIPPET_TRUNCATE_CHARS);
        let mut snippet = cut.to_string();
        if cut.len() < text.len() {
            snippet.push('…');
        }
        snippets.push(snippet);
    }

    snippets
}

fn has_unwanted_ancestor(
    element: scraper::ElementRef<'_>,
    extra_cleanup_classes: &[String],
) -> bool {
    element.ancestors().any(|node| {
        scraper::ElementRef::wrap(node)
            .and_then(|el| el.value().attr("class"))
            .is_some_and(|class| class_matches_unwanted(class, extra_cleanup_classes))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(len: usize, seed: &str) -> String {
        let mut text = String::new();
        while text.chars().count() < len {
            text.push_str(seed);
            text.push(' ');
        }
        text
    }

    #[test]
    fn collects_up_to_three_long_unique_texts() {
        let p1 = para(120, "alpha");
        let p2 = para(120, "bravo");
        let p3 = para(120, "charlie");
        let p4 = para(120, "delta");
        let html = format!("<body><p>{p1}</p><p>{p2}</p><p>{p3}</p><p>{p4}</p></body>");
        let snippets = extract_snippets(&html, &[]);
        assert_eq!(snippets.len(), 3);
        assert!(snippets[0].starts_with("alpha"));
        assert!(snippets[2].starts_with("charlie"));
    }

    #[test]
    fn skips_short_duplicate_and_unwanted_text() {
        let long = para(120, "real story text");
        let html = format!(
            "<body>\
             <p>too short</p>\
             <div class=\"sidebar\"><p>{long}</p></div>\
             <p>{long}</p>\
             <p>{long}</p>\
             </body>"
        );
        let snippets = extract_snippets(&html, &[]);
        // Sidebar copy skipped, duplicate collapsed
        assert_eq!(snippets.len(), 1);
    }

    #[test]
    fn truncates_at_word_boundary() {
        let long = para(400, "word");
        let html = format!("<body><blockquote>{long}</blockquote></body>");
        let snippets = extract_snippets(&html, &[]);
        assert_eq!(snippets.len(), 1);
        let snippet = &snippets[0];
        assert!(snippet.chars().count() <= SNIPPET_TRUNCATE_CHARS + 1);
        assert!(snippet.ends_with('…'));
        assert!(!snippet.trim_end_matches('…').ends_with(' '));
    }

    #[test]
    fn empty_page_yields_empty_sequence() {
        assert!(extract_snippets("<body><div>hi</div></body>", &[]).is_empty());
    }
}
