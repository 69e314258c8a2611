//! Broadcast bus for worker status events.
//!
//! Built on `tokio::sync::broadcast`: per-subscriber ordering is the
//! channel's ordering, and a subscriber that falls behind loses the oldest
//! events rather than slowing publishers down. Publish failures (no
//! subscribers) are normal and ignored.

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::types::{SlotStatus, WorkerSlot, WorkerStatusEvent};

/// Default per-subscriber buffer.
const DEFAULT_CAPACITY: usize = 256;

/// Worker-status publish/subscribe hub plus the live slot table.
#[derive(Debug)]
pub struct StatusBus {
    sender: broadcast::Sender<WorkerStatusEvent>,
    slots: Mutex<Vec<WorkerSlot>>,
}

impl StatusBus {
    /// A bus tracking `worker_count` slots with the default buffer.
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        Self::with_capacity(worker_count, DEFAULT_CAPACITY)
    }

    /// A bus with an explicit per-subscriber buffer capacity.
    #[must_use]
    pub fn with_capacity(worker_count: usize, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let slots = (0..worker_count).map(WorkerSlot::idle).collect();
        Self {
            sender,
            slots: Mutex::new(slots),
        }
    }

    /// Subscribe to status events from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerStatusEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Snapshot of every worker slot.
    #[must_use]
    pub fn active_slots(&self) -> Vec<WorkerSlot> {
        self.slots.lock().clone()
    }

    /// Record and publish the start of a scrape on `worker_id`.
    pub fn scrape_started(&self, worker_id: usize, scrape_id: Uuid, url: &str) {
        let started_at = chrono::Utc::now();

        {
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get_mut(worker_id) {
                slot.scrape_id = Some(scrape_id);
                slot.url = Some(url.to_string());
                slot.started_at = Some(started_at);
                slot.status = SlotStatus::Active;
            }
        }

        self.publish(WorkerStatusEvent::ScrapeStarted {
            worker_id,
            scrape_id,
            url: url.to_string(),
            started_at,
        });
    }

    /// Record and publish the end of a scrape on `worker_id`.
    pub fn scrape_ended(&self, worker_id: usize, scrape_id: Uuid, success: bool) {
        {
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.get_mut(worker_id) {
                slot.scrape_id = None;
                slot.url = None;
                slot.started_at = None;
                slot.status = SlotStatus::Idle;
            }
        }

        self.publish(WorkerStatusEvent::scrape_ended(worker_id, scrape_id, success));
    }

    fn publish(&self, event: WorkerStatusEvent) {
        // Best-effort: an empty bus is not an error and a full subscriber
        // buffer drops its oldest events by broadcast semantics.
        if let Err(e) = self.sender.send(event) {
            debug!("No status subscribers: {e}");
        }
    }
}
