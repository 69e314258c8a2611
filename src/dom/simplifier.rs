//! Compact DOM skeleton for language-model prompts.
//!
//! Produces an HTML-like outline of the document that preserves hierarchy
//! and the attributes useful for writing selectors (`id`, `class`, `role`,
//! `aria-label`) while stripping everything that bloats or misleads:
//! scripts, styles, hidden elements, ad/nav/social chrome, long text runs,
//! deep nesting and repeated siblings.

use scraper::{ElementRef, Html};
use std::fmt::Write as _;

use super::class_matches_unwanted;
use crate::utils::safe_truncate_chars;

/// Raw HTML beyond this is cut before parsing; pathological pages must not
/// turn into pathological regex or traversal work.
pub const MAX_INPUT_HTML_BYTES: usize = 1024 * 1024;

/// Hard cap on the simplified output, in characters.
pub const MAX_SIMPLIFIED_CHARS: usize = 8000;

/// Text nodes are cut to this many characters with an ellipsis.
const MAX_TEXT_CHARS: usize = 50;

/// Nesting beyond this depth is elided.
const MAX_DEPTH: usize = 10;

/// Consecutive same-tag siblings rendered before collapsing the rest.
const MAX_SIBLING_REPEATS: usize = 2;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "svg", "iframe", "template"];

/// Simplify `html` into a compact skeleton for the LLM prompt.
///
/// `extra_cleanup_classes` extends the default unwanted-class set with the
/// per-site fragments from the domain's stored config.
#[must_use]
pub fn simplify_dom(html: &str, extra_cleanup_classes: &[String]) -> String {
    let bounded = truncate_input(html);
    let document = Html::parse_document(bounded);

    let root = document
        .select(&body_selector())
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut out = String::with_capacity(4096);
    render_element(root, 0, extra_cleanup_classes, &mut out);

    if out.chars().count() > MAX_SIMPLIFIED_CHARS {
        let mut cut = safe_truncate_chars(&out, MAX_SIMPLIFIED_CHARS - 1).to_string();
        cut.push('…');
        return cut;
    }
    out
}

fn body_selector() -> scraper::Selector {
    scraper::Selector::parse("body").expect("hardcoded CSS selector 'body' is valid")
}

/// Cut input at the byte cap, backing up to a UTF-8 boundary.
fn truncate_input(html: &str) -> &str {
    if html.len() <= MAX_INPUT_HTML_BYTES {
        return html;
    }
    let mut end = MAX_INPUT_HTML_BYTES;
    while end > 0 && !html.is_char_boundary(end) {
        end -= 1;
    }
    &html[..end]
}

fn render_element(el: ElementRef<'_>, depth: usize, extra_classes: &[String], out: &mut String) {
    // Stop growing the output once the cap is passed; the caller trims.
    if out.len() > MAX_SIMPLIFIED_CHARS * 4 {
        return;
    }

    let tag = el.value().name();
    if SKIPPED_TAGS.contains(&tag) {
        return;
    }
    if is_hidden(el) {
        return;
    }
    if let Some(class) = el.value().attr("class")
        && class_matches_unwanted(class, extra_classes)
    {
        return;
    }

    out.push('<');
    out.push_str(tag);
    for attr in ["id", "class", "role", "aria-label"] {
        if let Some(val) = el.value().attr(attr)
            && !val.trim().is_empty()
        {
            let _ = write!(
                out,
                " {attr}=\"{}\"",
                html_escape::encode_double_quoted_attribute(val.trim())
            );
        }
    }
    out.push('>');

    if depth >= MAX_DEPTH {
        out.push('⋯');
    } else {
        render_children(el, depth, extra_classes, out);
    }

    let _ = write!(out, "</{tag}>");
}

fn render_children(el: ElementRef<'_>, depth: usize, extra_classes: &[String], out: &mut String) {
    // Track consecutive same-tag element runs for collapsing.
    let mut run_tag: Option<String> = None;
    let mut run_len = 0usize;
    let mut suppressed = 0usize;

    for child in el.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let tag = child_el.value().name().to_string();
            if run_tag.as_deref() == Some(tag.as_str()) {
                run_len += 1;
            } else {
                flush_collapsed(&run_tag, suppressed, out);
                run_tag = Some(tag);
                run_len = 1;
                suppressed = 0;
            }

            if run_len <= MAX_SIBLING_REPEATS {
                render_element(child_el, depth + 1, extra_classes, out);
            } else {
                suppressed += 1;
            }
        } else if let Some(text) = child.value().as_text() {
            let collapsed = collapse_whitespace(text);
            if collapsed.is_empty() {
                continue;
            }
            // Text breaks a sibling run
            flush_collapsed(&run_tag, suppressed, out);
            run_tag = None;
            run_len = 0;
            suppressed = 0;

            let cut = safe_truncate_chars(&collapsed, MAX_TEXT_CHARS);
            out.push_str(cut);
            if cut.len() < collapsed.len() {
                out.push('…');
            }
        }
        // Comments and other node kinds are dropped.
    }

    flush_collapsed(&run_tag, suppressed, out);
}

fn flush_collapsed(run_tag: &Option<String>, suppressed: usize, out: &mut String) {
    if suppressed > 0
        && let Some(tag) = run_tag
    {
        let _ = write!(out, "<!--{suppressed} more {tag}-->");
    }
}

fn is_hidden(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() {
        return true;
    }
    if v.attr("aria-hidden") == Some("true") {
        return true;
    }
    if let Some(style) = v.attr("style") {
        let style = style.to_ascii_lowercase();
        let style: String = style.split_whitespace().collect();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
