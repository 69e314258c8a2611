//! Deterministic content-quality scoring for candidate elements.
//!
//! A candidate that fails the minimum-paragraph gate scores exactly 0 and
//! can never pass. Everything else is a linear combination of structural
//! signals measured inside the live page. Identical inputs always produce
//! identical scores; there is no randomness anywhere in ranking.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::browser::ElementProbe;

static DESCRIPTIVE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)article|content|body|story|main|post|entry")
        .expect("hardcoded descriptive-attribute regex is valid")
});

/// Tunable weights for the scoring factors. Defaults match the engine's
/// shipped behavior; all values are overridable through the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Candidates with fewer `<p>` descendants than this score exactly 0.
    pub min_paragraphs: u32,
    /// Flat bonus when the XPath matches exactly one element.
    pub single_match_bonus: f64,
    /// Per-paragraph linear bonus.
    pub paragraph_weight: f64,
    /// Linear penalty times (nav+aside+footer+header) / descendants.
    pub unwanted_ratio_penalty: f64,
    /// Flat bonus for `<article>` or `<main>` elements.
    pub semantic_tag_bonus: f64,
    /// Flat bonus for a descriptive id/class.
    pub descriptive_attr_bonus: f64,
    /// Linear bonus times text length / HTML length.
    pub text_density_weight: f64,
    /// Linear penalty times anchor count / descendants.
    pub link_density_penalty: f64,
    /// Flat bonus when any media descendant exists.
    pub media_bonus: f64,
    /// Linear penalty per XPath complexity unit.
    pub complexity_penalty: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            min_paragraphs: 5,
            single_match_bonus: 80.0,
            paragraph_weight: 1.0,
            unwanted_ratio_penalty: 75.0,
            semantic_tag_bonus: 75.0,
            descriptive_attr_bonus: 30.0,
            text_density_weight: 50.0,
            link_density_penalty: 30.0,
            media_bonus: 25.0,
            complexity_penalty: 5.0,
        }
    }
}

impl ScoringWeights {
    /// Whether a score passes: strictly positive after the paragraph gate.
    #[must_use]
    pub fn passes(&self, score: f64) -> bool {
        score > 0.0
    }
}

/// XPath complexity: slash-separated step count plus predicate count.
/// Simpler selectors generalize better across pages of a domain.
#[must_use]
pub fn xpath_complexity(xpath: &str) -> u32 {
    let slashes = xpath.matches('/').count();
    let predicates = xpath.matches('[').count();
    u32::try_from(slashes + predicates).unwrap_or(u32::MAX)
}

/// Score one candidate. Pure and deterministic.
#[must_use]
pub fn score_candidate(weights: &ScoringWeights, probe: &ElementProbe, xpath: &str) -> f64 {
    let details = &probe.details;

    // The gate: no article-like paragraph structure, no score.
    if details.paragraph_count < weights.min_paragraphs {
        return 0.0;
    }

    let mut score = 0.0;

    if probe.matches_in_document == 1 {
        score += weights.single_match_bonus;
    }

    score += weights.paragraph_weight * f64::from(details.paragraph_count);

    if details.descendant_count > 0 {
        let descendants = f64::from(details.descendant_count);
        score -= weights.unwanted_ratio_penalty * (f64::from(details.unwanted_count) / descendants);
        score -= weights.link_density_penalty * (f64::from(details.anchor_count) / descendants);
    }

    if matches!(details.tag_name.as_str(), "article" | "main") {
        score += weights.semantic_tag_bonus;
    }

    if DESCRIPTIVE_ATTR.is_match(&details.id) || DESCRIPTIVE_ATTR.is_match(&details.class) {
        score += weights.descriptive_attr_bonus;
    }

    if details.html_length > 0 {
        let density = details.text_length as f64 / details.html_length as f64;
        score += weights.text_density_weight * density;
    }

    if details.media_count > 0 {
        score += weights.media_bonus;
    }

    score -= weights.complexity_penalty * f64::from(xpath_complexity(xpath));

    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementDetails;

    fn probe(details: ElementDetails, matches: u32) -> ElementProbe {
        ElementProbe {
            details,
            matches_in_document: matches,
        }
    }

    fn article_details(paragraphs: u32) -> ElementDetails {
        ElementDetails {
            tag_name: "article".to_string(),
            id: String::new(),
            class: String::new(),
            text_length: 3000,
            html_length: 6000,
            descendant_count: 40,
            paragraph_count: paragraphs,
            anchor_count: 2,
            media_count: 1,
            unwanted_count: 0,
            heading_count: 2,
            list_count: 0,
        }
    }

    #[test]
    fn paragraph_gate_zeroes_the_score() {
        let weights = ScoringWeights::default();
        let candidate = probe(article_details(4), 1);
        let score = score_candidate(&weights, &candidate, "//article");
        assert_eq!(score, 0.0);
        assert!(!weights.passes(score));
    }

    #[test]
    fn healthy_article_passes() {
        let weights = ScoringWeights::default();
        let candidate = probe(article_details(12), 1);
        let score = score_candidate(&weights, &candidate, "//article");
        // 80 (single) + 12 (p) + 75 (semantic) + 25 (media) + 25 (density)
        // - 1.5 (links) - 10 (complexity)
        assert!(score > 180.0, "score was {score}");
        assert!(weights.passes(score));
    }

    #[test]
    fn scoring_is_deterministic() {
        let weights = ScoringWeights::default();
        let candidate = probe(article_details(9), 1);
        let first = score_candidate(&weights, &candidate, "//main//article[1]");
        for _ in 0..10 {
            assert_eq!(
                score_candidate(&weights, &candidate, "//main//article[1]"),
                first
            );
        }
    }

    #[test]
    fn unwanted_and_link_density_penalize() {
        let weights = ScoringWeights::default();
        let clean = probe(article_details(8), 1);
        let mut noisy_details = article_details(8);
        noisy_details.unwanted_count = 20;
        noisy_details.anchor_count = 30;
        let noisy = probe(noisy_details, 1);

        let clean_score = score_candidate(&weights, &clean, "//article");
        let noisy_score = score_candidate(&weights, &noisy, "//article");
        assert!(clean_score > noisy_score);
    }

    #[test]
    fn descriptive_attributes_add_bonus() {
        let weights = ScoringWeights::default();
        let mut details = article_details(8);
        details.tag_name = "div".to_string();
        let plain = probe(details.clone(), 1);
        details.id = "post-body".to_string();
        let descriptive = probe(details, 1);

        let plain_score = score_candidate(&weights, &plain, "//div");
        let descriptive_score = score_candidate(&weights, &descriptive, "//div");
        assert_eq!(
            descriptive_score - plain_score,
            weights.descriptive_attr_bonus
        );
    }

    #[test]
    fn complexity_counts_steps_and_predicates() {
        assert_eq!(xpath_complexity("//article"), 2);
        assert_eq!(xpath_complexity("//div[@id='x']"), 3);
        assert_eq!(xpath_complexity("//main//div[@class='a']/p[1]"), 7);
    }

    #[test]
    fn multi_match_loses_the_single_match_bonus() {
        let weights = ScoringWeights::default();
        let single = probe(article_details(8), 1);
        let multi = probe(article_details(8), 7);
        let diff = score_candidate(&weights, &single, "//article")
            - score_candidate(&weights, &multi, "//article");
        assert_eq!(diff, weights.single_match_bonus);
    }
}
