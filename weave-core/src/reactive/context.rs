//! Tracking Context
//!
//! The tracking context records which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a dep is read, the
//! current watcher is registered as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of targets. Evaluating a watcher pushes it,
//! and the guard returned by [`TrackingScope::enter`] pops it again when
//! dropped, including during unwinding. Nested evaluations (a render that
//! reads a computed value, a parent render that mounts a child) therefore
//! resume tracking the outer watcher as soon as the inner one finishes.
//!
//! A `None` target is pushed by [`untracked`]; reads performed inside it are
//! not recorded by anyone. Lifecycle hooks run this way.

use std::cell::RefCell;

use super::watcher::{Watcher, WatcherId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the tracking target when dropped.
pub struct TrackingScope {
    expected: Option<WatcherId>,
}

impl TrackingScope {
    /// Make `target` the active tracking target until the guard drops.
    pub fn enter(target: Option<Watcher>) -> Self {
        let expected = target.as_ref().map(Watcher::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { expected }
    }

    /// Check if a watcher is currently recording dependencies.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The watcher currently recording dependencies, if any.
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Nesting depth of the target stack.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            debug_assert!(popped.is_some(), "tracking stack popped while empty");
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.as_ref().map(Watcher::id),
                    self.expected,
                    "TrackingScope mismatch"
                );
            }
        });
    }
}

/// Run `f` with dependency tracking disabled.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _scope = TrackingScope::enter(None);
    f()
}
