//! Update Scheduling
//!
//! Watchers notified by a write are not run immediately. They are queued and
//! run together in one flush, deferred through the host with
//! [`next_tick`]. See the `queue` module docs for the ordering guarantees.

mod queue;
mod tick;

pub use queue::{is_queued, phase, queue_activated_component, queue_watcher, SchedulerPhase};
pub use tick::{next_tick, tick};
