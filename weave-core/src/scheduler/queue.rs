//! Watcher Queue
//!
//! Notifications do not re-run watchers directly. They are collected here
//! and run together in one flush on the next tick.
//!
//! # Flush Order
//!
//! The queue is sorted by watcher id before it runs. Ids grow with creation
//! order, which gives three guarantees:
//!
//! 1. Parents update before children (a parent is created first).
//! 2. A component's user watchers run before its render watcher.
//! 3. If a component is destroyed during a parent's update, its watchers
//!    are torn down and the remaining queue entries become no-ops.
//!
//! A watcher queued while the flush is running is inserted at its sorted
//! position among the entries that have not run yet, and runs in the same
//! flush. A watcher that keeps re-queuing itself is dropped from the flush
//! once it exceeds the configured limit. A watcher that panics is reported
//! and the flush moves on to the next entry.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};

use crate::component::lifecycle::activate_child_component;
use crate::component::Instance;
use crate::diagnostics::{self, Diagnostic};
use crate::reactive::{Watcher, WatcherId};
use crate::runtime::Runtime;

use super::tick::next_tick;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing queued.
    Idle,
    /// A flush has been requested but has not started.
    Waiting,
    /// The queue is being run.
    Flushing,
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    activated: Vec<Instance>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, u32>,
    abandoned: HashSet<WatcherId>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

impl SchedulerState {
    fn reset(&mut self) -> (Vec<Watcher>, Vec<Instance>) {
        let queue = std::mem::take(&mut self.queue);
        let activated = std::mem::take(&mut self.activated);
        self.has.clear();
        self.circular.clear();
        self.abandoned.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
        (queue, activated)
    }
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// The current phase of this thread's scheduler.
pub fn phase() -> SchedulerPhase {
    SCHEDULER.with(|state| {
        let state = state.borrow();
        if state.flushing {
            SchedulerPhase::Flushing
        } else if state.waiting {
            SchedulerPhase::Waiting
        } else {
            SchedulerPhase::Idle
        }
    })
}

/// Whether `id` is waiting to run.
pub fn is_queued(id: WatcherId) -> bool {
    SCHEDULER.with(|state| state.borrow().has.contains(&id))
}

/// Queue `watcher` for the next flush.
///
/// Queuing a watcher that is already pending is a no-op.
pub fn queue_watcher(watcher: &Watcher) {
    let id = watcher.id();
    let schedule = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if state.has.contains(&id) || state.abandoned.contains(&id) {
            return false;
        }
        state.has.insert(id);

        if !state.flushing {
            state.queue.push(watcher.clone());
        } else {
            // Never before the entry that is running right now.
            let floor = state.index + 1;
            let mut at = state.queue.len();
            while at > floor && state.queue[at - 1].id() > id {
                at -= 1;
            }
            state.queue.insert(at, watcher.clone());
        }
        tracing::trace!(watcher = %id, flushing = state.flushing, "queued");

        !std::mem::replace(&mut state.waiting, true)
    });

    if schedule {
        next_tick(flush_scheduler_queue);
    }
}

/// Queue a kept-alive instance that was re-inserted during patching.
///
/// Its `activated` hooks run after the whole tree has been patched.
pub fn queue_activated_component(vm: &Instance) {
    vm.set_inactive(false);
    SCHEDULER.with(|state| state.borrow_mut().activated.push(vm.clone()));
}

/// Run every queued watcher, then the activated and updated hooks.
pub(crate) fn flush_scheduler_queue() {
    let max_update_count = Runtime::config().max_update_count;
    let queued = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.queue.sort_by_key(Watcher::id);
        state.queue.len()
    });
    tracing::trace!(queued, "flush started");

    // The queue may grow while we iterate, so its length is re-read every
    // step and no borrow is held across a run.
    let mut index = 0;
    loop {
        let next = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            state.index = index;
            let watcher = state.queue.get(index).cloned()?;
            let skip = state.abandoned.contains(&watcher.id());
            Some((watcher, skip))
        });
        let Some((watcher, skip)) = next else {
            break;
        };
        index += 1;
        if skip {
            continue;
        }

        let id = watcher.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            watcher.before_run();
            SCHEDULER.with(|state| state.borrow_mut().has.remove(&id));
            watcher.run();
        }));
        if let Err(payload) = outcome {
            SCHEDULER.with(|state| state.borrow_mut().has.remove(&id));
            diagnostics::report(Diagnostic::WatcherPanicked {
                watcher: id,
                target: watcher.describe(),
                message: panic_message(payload.as_ref()),
            });
        }

        let overflow = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return None;
            }
            let count = {
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                *count
            };
            if count > max_update_count {
                state.has.remove(&id);
                state.abandoned.insert(id);
                Some(count)
            } else {
                None
            }
        });

        if let Some(count) = overflow {
            diagnostics::report(Diagnostic::InfiniteUpdateLoop {
                watcher: id,
                target: watcher.describe(),
                count,
            });
        }
    }

    let (updated, activated) = SCHEDULER.with(|state| state.borrow_mut().reset());
    tracing::trace!(ran = updated.len(), activated = activated.len(), "flush finished");

    call_activated_hooks(&activated);
    call_updated_hooks(&updated);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

fn call_activated_hooks(queue: &[Instance]) {
    for vm in queue {
        vm.set_inactive(true);
        activate_child_component(vm, true);
    }
}

fn call_updated_hooks(queue: &[Watcher]) {
    let mut seen = HashSet::new();
    for watcher in queue.iter().rev() {
        if seen.insert(watcher.id()) {
            watcher.after_flush();
        }
    }
}
