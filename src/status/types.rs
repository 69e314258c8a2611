//! Worker status event and slot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a worker slot currently holds a scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotStatus {
    Idle,
    Active,
}

/// One of the `N` execution contexts, as shown to observers.
///
/// Slots are reused across scrapes; the `scrape_id` is fresh per
/// admission, so two concurrent scrapes of one URL stay distinguishable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSlot {
    pub worker_id: usize,
    pub scrape_id: Option<Uuid>,
    pub url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub status: SlotStatus,
}

impl WorkerSlot {
    #[must_use]
    pub fn idle(worker_id: usize) -> Self {
        Self {
            worker_id,
            scrape_id: None,
            url: None,
            started_at: None,
            status: SlotStatus::Idle,
        }
    }
}

/// Events published over the status bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerStatusEvent {
    /// A worker began executing a scrape.
    ScrapeStarted {
        worker_id: usize,
        scrape_id: Uuid,
        url: String,
        started_at: DateTime<Utc>,
    },
    /// A worker finished a scrape.
    ScrapeEnded {
        worker_id: usize,
        scrape_id: Uuid,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

impl WorkerStatusEvent {
    #[must_use]
    pub fn scrape_started(worker_id: usize, scrape_id: Uuid, url: String) -> Self {
        Self::ScrapeStarted {
            worker_id,
            scrape_id,
            url,
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn scrape_ended(worker_id: usize, scrape_id: Uuid, success: bool) -> Self {
        Self::ScrapeEnded {
            worker_id,
            scrape_id,
            success,
            timestamp: Utc::now(),
        }
    }
}
