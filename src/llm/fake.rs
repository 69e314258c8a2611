//! Scripted suggester for tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{SelectorPrompt, XpathSuggester};
use crate::discovery::feedback::FeedbackEntry;

/// One recorded call to the fake.
#[derive(Debug, Clone)]
pub struct RecordedPrompt {
    pub url: String,
    pub simplified_dom: String,
    pub snippets: Vec<String>,
    pub feedback: Vec<FeedbackEntry>,
}

/// [`XpathSuggester`] that replays scripted candidate lists in order and
/// records every prompt for assertions.
#[derive(Default)]
pub struct FakeSuggester {
    replies: Mutex<VecDeque<Vec<String>>>,
    calls: Mutex<Vec<RecordedPrompt>>,
    fail_always: bool,
}

impl FakeSuggester {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A suggester whose every call errors, for provider-outage tests.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_always: true,
            ..Self::default()
        }
    }

    /// Queue the reply for the next unanswered call.
    pub fn push_reply<I, S>(&self, candidates: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies
            .lock()
            .push_back(candidates.into_iter().map(Into::into).collect());
    }

    /// Every prompt received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedPrompt> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl XpathSuggester for FakeSuggester {
    async fn suggest_xpaths(&self, prompt: SelectorPrompt<'_>) -> Result<Vec<String>> {
        self.calls.lock().push(RecordedPrompt {
            url: prompt.url.to_string(),
            simplified_dom: prompt.simplified_dom.to_string(),
            snippets: prompt.snippets.to_vec(),
            feedback: prompt.feedback.to_vec(),
        });

        if self.fail_always {
            return Err(anyhow!("scripted LLM outage"));
        }

        Ok(self.replies.lock().pop_front().unwrap_or_default())
    }
}
