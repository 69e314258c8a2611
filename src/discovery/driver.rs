//! The discovery loop driver.
//!
//! Runs up to `max_llm_retries + 1` iterations against one loaded page.
//! Candidates are validated in parallel (the browser contract allows
//! concurrent XPath evaluation on one page), scored, and either accepted
//! or written into the feedback ledger with the reason they failed.

use futures::future::join_all;
use tracing::{debug, info};

use super::feedback::FeedbackLedger;
use super::scoring::{ScoringWeights, score_candidate, xpath_complexity};
use crate::browser::{Browser, PageId};
use crate::dom::{extract_snippets, simplify_dom};
use crate::engine::types::ScrapeError;
use crate::llm::{SelectorPrompt, XpathSuggester};

/// A selector that won discovery, with the content it extracted.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub xpath: String,
    pub score: f64,
    /// Text content of the first match, extracted from the same loaded
    /// page the selector was validated against.
    pub content: String,
}

struct ScoredCandidate {
    xpath: String,
    score: f64,
    paragraph_count: u32,
    complexity: u32,
    order: usize,
}

/// One discovery run over a loaded page.
pub struct DiscoveryLoop<'a> {
    browser: &'a dyn Browser,
    suggester: &'a dyn XpathSuggester,
    weights: &'a ScoringWeights,
    /// Iterations = this + 1.
    max_llm_retries: u32,
}

impl<'a> DiscoveryLoop<'a> {
    #[must_use]
    pub fn new(
        browser: &'a dyn Browser,
        suggester: &'a dyn XpathSuggester,
        weights: &'a ScoringWeights,
        max_llm_retries: u32,
    ) -> Self {
        Self {
            browser,
            suggester,
            weights,
            max_llm_retries,
        }
    }

    /// Drive the loop to success, exhaustion, or an LLM failure.
    ///
    /// `Ok(None)` means no candidate met the thresholds (or the model kept
    /// repeating itself); `Err` carries provider failures only.
    pub async fn discover(
        &self,
        page: PageId,
        url: &str,
        html: &str,
        cleanup_classes: &[String],
    ) -> Result<Option<DiscoveryOutcome>, ScrapeError> {
        let simplified_dom = simplify_dom(html, cleanup_classes);
        let snippets = extract_snippets(html, cleanup_classes);
        let mut ledger = FeedbackLedger::new();

        let total_iterations = self.max_llm_retries + 1;
        for iteration in 1..=total_iterations {
            let prompt = SelectorPrompt {
                url,
                simplified_dom: &simplified_dom,
                snippets: &snippets,
                feedback: ledger.entries(),
            };

            let candidates = self
                .suggester
                .suggest_xpaths(prompt)
                .await
                .map_err(|e| ScrapeError::Llm(format!("{e:#}")))?;

            // Normalize and drop everything already tried this request,
            // including duplicates inside this reply.
            let mut fresh: Vec<String> = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let candidate = candidate.trim();
                if !candidate.is_empty() && ledger.mark_tried(candidate) {
                    fresh.push(candidate.to_string());
                }
            }

            if fresh.is_empty() {
                // The model is stuck on previously-tried selectors; more
                // iterations would only repeat the same ledger.
                info!(url, iteration, "Discovery stopped: no new candidates");
                return Ok(None);
            }

            debug!(url, iteration, count = fresh.len(), "Validating candidates");

            let probes = join_all(
                fresh
                    .iter()
                    .map(|xpath| self.browser.get_element_details(page, xpath)),
            )
            .await;

            let mut best: Option<ScoredCandidate> = None;
            let mut failures: Vec<(String, String)> = Vec::new();

            for (order, (xpath, probe)) in fresh.iter().zip(probes).enumerate() {
                let probe = match probe {
                    Ok(Some(probe)) => probe,
                    Ok(None) => {
                        failures.push((xpath.clone(), "matched 0 elements".to_string()));
                        continue;
                    }
                    Err(e) => {
                        failures.push((xpath.clone(), format!("evaluation failed: {e:#}")));
                        continue;
                    }
                };

                if probe.details.paragraph_count < self.weights.min_paragraphs {
                    failures.push((
                        xpath.clone(),
                        format!(
                            "too few paragraphs: {}<{}",
                            probe.details.paragraph_count, self.weights.min_paragraphs
                        ),
                    ));
                    continue;
                }

                let score = score_candidate(self.weights, &probe, xpath);
                if !self.weights.passes(score) {
                    failures.push((
                        xpath.clone(),
                        format!("score={score:.1}, below threshold"),
                    ));
                    continue;
                }

                let scored = ScoredCandidate {
                    xpath: xpath.clone(),
                    score,
                    paragraph_count: probe.details.paragraph_count,
                    complexity: xpath_complexity(xpath),
                    order,
                };
                if best.as_ref().is_none_or(|current| beats(&scored, current)) {
                    best = Some(scored);
                }
            }

            if let Some(winner) = best {
                info!(
                    url,
                    xpath = winner.xpath,
                    score = winner.score,
                    iteration,
                    "Discovery found a selector"
                );
                let content = self.extract_text(page, &winner.xpath).await?;
                return Ok(Some(DiscoveryOutcome {
                    xpath: winner.xpath,
                    score: winner.score,
                    content,
                }));
            }

            for (xpath, reason) in failures {
                ledger.record_failure(xpath, reason);
            }
        }

        info!(url, "Discovery exhausted all iterations");
        Ok(None)
    }

    async fn extract_text(&self, page: PageId, xpath: &str) -> Result<String, ScrapeError> {
        let texts = self
            .browser
            .evaluate_xpath(page, xpath)
            .await
            .map_err(|e| ScrapeError::Internal(format!("{e:#}")))?;
        texts
            .and_then(|t| t.into_iter().next())
            .ok_or_else(|| {
                // The selector validated a moment ago on this very page.
                ScrapeError::Internal(format!(
                    "winning selector '{xpath}' no longer matches its page"
                ))
            })
    }
}

/// Strictly-better comparison implementing the tie-break chain: score,
/// then paragraph count, then lower complexity, then earlier order.
fn beats(challenger: &ScoredCandidate, incumbent: &ScoredCandidate) -> bool {
    if challenger.score != incumbent.score {
        return challenger.score > incumbent.score;
    }
    if challenger.paragraph_count != incumbent.paragraph_count {
        return challenger.paragraph_count > incumbent.paragraph_count;
    }
    if challenger.complexity != incumbent.complexity {
        return challenger.complexity < incumbent.complexity;
    }
    challenger.order < incumbent.order
}
