//! Computed Values
//!
//! A Computed is a cached derived value backed by a lazy watcher.
//!
//! # How Computed Values Work
//!
//! 1. The value is computed on first read, not on creation.
//!
//! 2. When a dependency is notified the watcher only marks itself dirty.
//!    Nothing is recomputed until somebody reads the value again.
//!
//! 3. Reading a computed value inside another watcher's evaluation makes
//!    that watcher depend on everything the computed value depends on, so it
//!    is scheduled whenever the computed value may have changed.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::context::{untracked, TrackingScope};
use super::watcher::{Watcher, WatcherOptions};

/// A cached derived value that recomputes only when read after a change.
pub struct Computed<T> {
    watcher: Watcher,
    value: Rc<RefCell<Option<T>>>,
    compute: Rc<dyn Fn() -> T>,
}

impl<T> Computed<T>
where
    T: Clone + 'static,
{
    /// Create a new computed value. The computation runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let compute: Rc<dyn Fn() -> T> = Rc::new(compute);
        let value = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&value);
        let getter = Rc::clone(&compute);
        let watcher = Watcher::new(
            move || {
                let next = getter();
                *slot.borrow_mut() = Some(next);
            },
            WatcherOptions::default().lazy(true),
        );
        Self {
            watcher,
            value,
            compute,
        }
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        let cached = self.value.borrow().clone();
        let value = match cached {
            Some(value) if !self.watcher.is_dirty() => value,
            _ => {
                self.watcher.evaluate();
                self.value.borrow().clone().unwrap_or_else(|| self.compute_untracked())
            }
        };
        if TrackingScope::is_active() {
            self.watcher.depend();
        }
        value
    }

    // Only reached when the watcher refused a re-entrant evaluation.
    fn compute_untracked(&self) -> T {
        untracked(|| (self.compute)())
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The lazy watcher behind this value.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Stop tracking dependencies.
    pub fn teardown(&self) {
        self.watcher.teardown();
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            watcher: self.watcher.clone(),
            value: Rc::clone(&self.value),
            compute: Rc::clone(&self.compute),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher.id())
            .field("dirty", &self.watcher.is_dirty())
            .field("value", &*self.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::cell::Cell;

    #[test]
    fn computed_is_lazy_and_cached() {
        let count = Rc::new(Cell::new(0));
        let computed = {
            let count = Rc::clone(&count);
            Computed::new(move || {
                count.set(count.get() + 1);
                42
            })
        };

        assert_eq!(count.get(), 0);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn computed_recomputes_after_dependency_change() {
        let base = Signal::new(5);
        let doubled = {
            let base = base.clone();
            Computed::new(move || base.get() * 2)
        };

        assert_eq!(doubled.get(), 10);
        base.set(7);
        assert!(doubled.is_dirty());
        assert_eq!(doubled.get(), 14);
    }

    #[test]
    fn reader_of_computed_depends_on_its_sources() {
        let base = Signal::new(1);
        let plus_ten = {
            let base = base.clone();
            Computed::new(move || base.get() + 10)
        };

        let seen = Rc::new(Cell::new(0));
        let _reader = {
            let plus_ten = plus_ten.clone();
            let seen = Rc::clone(&seen);
            Watcher::new(
                move || seen.set(plus_ten.get()),
                WatcherOptions::default().sync(true),
            )
        };

        assert_eq!(seen.get(), 11);
        base.set(2);
        assert_eq!(seen.get(), 12);
    }
}
