//! Signal Implementation
//!
//! A Signal is the simplest piece of observable state: one value behind one
//! dep.
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside a tracked evaluation records its dep on the
//!    evaluating watcher.
//!
//! 2. Writing a different value notifies every subscribed watcher.
//!
//! 3. Writing an equal value is a no-op.
//!
//! Signals are single-threaded: clones share the same cell and dep.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::dep::{Dep, DepId};

struct SignalInner<T> {
    dep: Dep,
    value: RefCell<T>,
}

/// A reactive cell holding a value of type T.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                dep: Dep::new(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.dep.id()
    }

    /// The dep behind this signal.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        self.inner.dep.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dep.track();
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers if it differs.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.borrow_mut();
            if *guard == value {
                return;
            }
            *guard = value;
        }
        self.inner.dep.notify();
    }

    /// Update the value using a function.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = f(&self.inner.value.borrow());
        self.set(new_value);
    }

    /// Number of watchers currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dep.subscriber_count()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.dep.id())
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.inner.dep.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Watcher, WatcherOptions};
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscribers_only_on_change() {
        let signal = Signal::new(0);
        let runs = Rc::new(Cell::new(0));

        let _watcher = {
            let signal = signal.clone();
            let runs = Rc::clone(&runs);
            Watcher::new(
                move || {
                    signal.get();
                    runs.set(runs.get() + 1);
                },
                WatcherOptions::default().sync(true),
            )
        };

        signal.set(1);
        signal.set(1);
        signal.set(2);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let signal = Signal::new(0);
        let _watcher = {
            let signal = signal.clone();
            Watcher::new(
                move || {
                    signal.get_untracked();
                },
                WatcherOptions::default(),
            )
        };
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }
}
