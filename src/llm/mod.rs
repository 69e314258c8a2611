//! LLM capability: turning a simplified DOM into XPath candidates.
//!
//! The engine only depends on the [`XpathSuggester`] contract. The
//! production implementation speaks to any OpenAI-compatible chat
//! completions endpoint; the fake replays scripted candidate lists.

pub mod fake;
pub mod openai;
pub mod parse;

pub use fake::FakeSuggester;
pub use openai::OpenAiSuggester;
pub use parse::parse_xpath_reply;

use anyhow::Result;
use async_trait::async_trait;

use crate::discovery::feedback::FeedbackEntry;

/// Everything the model is shown for one discovery iteration.
#[derive(Debug, Clone)]
pub struct SelectorPrompt<'a> {
    pub url: &'a str,
    pub simplified_dom: &'a str,
    pub snippets: &'a [String],
    /// Candidates already tried this request, with why each failed.
    pub feedback: &'a [FeedbackEntry],
}

/// Contract for XPath candidate suggestion.
#[async_trait]
pub trait XpathSuggester: Send + Sync {
    /// Return candidate XPaths ordered most-promising first. May repeat
    /// earlier suggestions; the discovery loop deduplicates.
    async fn suggest_xpaths(&self, prompt: SelectorPrompt<'_>) -> Result<Vec<String>>;
}
