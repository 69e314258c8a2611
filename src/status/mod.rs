//! Live worker status for observers.
//!
//! Dashboards subscribe to a broadcast stream of scrape start/end events
//! and can snapshot the worker slot table at any time. Publishing is
//! best-effort and never on the critical path of a scrape.

pub mod bus;
pub mod types;

pub use bus::StatusBus;
pub use types::{SlotStatus, WorkerSlot, WorkerStatusEvent};
