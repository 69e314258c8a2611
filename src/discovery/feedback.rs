//! The feedback ledger: what was tried and why it failed.
//!
//! Fed back to the model on every iteration so it stops proposing dead
//! ends, and used to guarantee no candidate is validated twice within one
//! request.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One failed candidate and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub xpath: String,
    pub reason: String,
}

/// Accumulated per-request record of tried candidates.
#[derive(Debug, Default)]
pub struct FeedbackLedger {
    entries: Vec<FeedbackEntry>,
    tried: HashSet<String>,
}

impl FeedbackLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a candidate as tried without a failure reason yet (it is being
    /// validated). Returns false if it was already known.
    pub fn mark_tried(&mut self, xpath: &str) -> bool {
        self.tried.insert(xpath.to_string())
    }

    /// Whether a candidate has been seen before in this request.
    #[must_use]
    pub fn was_tried(&self, xpath: &str) -> bool {
        self.tried.contains(xpath)
    }

    /// Record why a tried candidate failed.
    pub fn record_failure(&mut self, xpath: impl Into<String>, reason: impl Into<String>) {
        let xpath = xpath.into();
        self.tried.insert(xpath.clone());
        self.entries.push(FeedbackEntry {
            xpath,
            reason: reason.into(),
        });
    }

    /// The failure entries, in the order they happened.
    #[must_use]
    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tried_set_and_entries_are_tracked_separately() {
        let mut ledger = FeedbackLedger::new();
        assert!(ledger.mark_tried("//article"));
        assert!(!ledger.mark_tried("//article"));
        assert!(ledger.was_tried("//article"));
        assert!(ledger.entries().is_empty());

        ledger.record_failure("//div[@id='x']", "matched 0 elements");
        assert!(ledger.was_tried("//div[@id='x']"));
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.entries()[0].reason, "matched 0 elements");
    }
}
