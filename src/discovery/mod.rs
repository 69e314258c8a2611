//! Selector discovery: ask the model, verify against the page, keep score.
//!
//! When no selector is known for a domain (or the known one stopped
//! working), the discovery loop iterates: prompt the LLM with a simplified
//! DOM plus a ledger of everything already tried, validate the candidates
//! it returns against the live page in parallel, and rank survivors with a
//! deterministic quality score. The best passing candidate wins and is
//! persisted for future scrapes.

pub mod driver;
pub mod feedback;
pub mod scoring;

pub use driver::{DiscoveryLoop, DiscoveryOutcome};
pub use feedback::{FeedbackEntry, FeedbackLedger};
pub use scoring::{ScoringWeights, score_candidate, xpath_complexity};
