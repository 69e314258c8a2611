//! Salvage XPath arrays out of model replies.
//!
//! Models are asked for a bare JSON array but routinely wrap it in prose or
//! markdown fences. Three strategies run in order: direct JSON parse,
//! fenced-code-block extraction, then a regex sweep for XPath-shaped
//! substrings. The first strategy producing at least one candidate wins.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("hardcoded fence regex is valid")
});

static XPATH_SHAPED: LazyLock<Regex> = LazyLock::new(|| {
    // An XPath as models write them: rooted with / or //, steps of names,
    // wildcards and predicates. Stops at quotes, backticks or whitespace.
    Regex::new(r#"//?[A-Za-z*][\w*.-]*(?:\[[^\]]*\])?(?:/{1,2}[A-Za-z*@][\w*.-]*(?:\[[^\]]*\])?)*"#)
        .expect("hardcoded xpath regex is valid")
});

/// Extract an ordered, deduplicated list of XPath strings from a raw model
/// reply. Returns an empty vector when nothing salvageable remains.
#[must_use]
pub fn parse_xpath_reply(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Some(candidates) = parse_json_array(trimmed)
        && !candidates.is_empty()
    {
        return dedupe(candidates);
    }

    for captures in FENCED_BLOCK.captures_iter(trimmed) {
        if let Some(candidates) = parse_json_array(captures[1].trim())
            && !candidates.is_empty()
        {
            return dedupe(candidates);
        }
    }

    let scavenged = XPATH_SHAPED
        .find_iter(trimmed)
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
        .filter(|s| s.starts_with('/'))
        .collect();
    dedupe(scavenged)
}

fn parse_json_array(text: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let array = match value {
        serde_json::Value::Array(items) => items,
        // Some models wrap the array in an object under an obvious key.
        serde_json::Value::Object(mut map) => {
            let key = ["xpaths", "candidates", "selectors"]
                .iter()
                .find(|k| map.contains_key(**k))?;
            match map.remove(*key)? {
                serde_json::Value::Array(items) => items,
                _ => return None,
            }
        }
        _ => return None,
    };

    Some(
        array
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

fn dedupe(candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .filter(|c| seen.insert(c.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json_array() {
        let reply = r#"["//article", "//main//div[@id='content']"]"#;
        assert_eq!(
            parse_xpath_reply(reply),
            vec!["//article", "//main//div[@id='content']"]
        );
    }

    #[test]
    fn wrapped_object_with_known_key() {
        let reply = r#"{"xpaths": ["//article[@class='post']"]}"#;
        assert_eq!(parse_xpath_reply(reply), vec!["//article[@class='post']"]);
    }

    #[test]
    fn fenced_markdown_block() {
        let reply = "Here are my suggestions:\n```json\n[\"//div[@id='story']\", \"//article\"]\n```\nGood luck!";
        assert_eq!(
            parse_xpath_reply(reply),
            vec!["//div[@id='story']", "//article"]
        );
    }

    #[test]
    fn regex_scavenging_from_prose() {
        let reply = "I would try //article first, and if that fails, \
                     maybe //div[@class='post-body'] could work.";
        let parsed = parse_xpath_reply(reply);
        assert!(parsed.contains(&"//article".to_string()));
        assert!(parsed.contains(&"//div[@class='post-body']".to_string()));
    }

    #[test]
    fn duplicates_collapse_preserving_order() {
        let reply = r#"["//article", "//main", "//article", "  //main  "]"#;
        assert_eq!(parse_xpath_reply(reply), vec!["//article", "//main"]);
    }

    #[test]
    fn garbage_yields_empty() {
        assert!(parse_xpath_reply("I cannot help with that.").is_empty());
        assert!(parse_xpath_reply("").is_empty());
        assert!(parse_xpath_reply("[1, 2, 3]").is_empty());
    }
}
