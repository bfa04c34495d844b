//! Observable channels.
//!
//! A [`Dep`] represents one piece of reactive state. Watchers that read it
//! while tracking become subscribers; writing it notifies them.
//!
//! Subscribers are held weakly and kept in insertion order. The watcher side
//! holds the strong half of every edge, so a dep never outlives the interest
//! in it and dropping a watcher unsubscribes it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::TrackingScope;
use super::watcher::{Watcher, WatcherId, WatcherInner};

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dep#{}", self.0)
    }
}

struct DepInner {
    id: DepId,
    subs: RefCell<IndexMap<WatcherId, Weak<WatcherInner>>>,
}

/// An observable channel that watchers subscribe to.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    /// Create a new dep with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subs: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the dep's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Record a read of this dep.
    ///
    /// If a watcher is the active tracking target it records the dep, which
    /// in turn subscribes it. Outside any tracked computation this is a no-op.
    pub fn track(&self) {
        if let Some(watcher) = TrackingScope::current() {
            watcher.add_dep(self);
        }
    }

    /// Add `watcher` to the subscribers unless it is already present.
    ///
    /// Only meaningful while `watcher` is the active tracking target; use
    /// [`Dep::track`] from state accessors.
    pub fn subscribe(&self, watcher: &Watcher) {
        debug_assert!(
            TrackingScope::current().is_some_and(|w| w.id() == watcher.id()),
            "subscribe called outside of {}'s evaluation",
            watcher.id()
        );
        self.add_sub(watcher);
    }

    pub(crate) fn add_sub(&self, watcher: &Watcher) {
        self.inner
            .subs
            .borrow_mut()
            .entry(watcher.id())
            .or_insert_with(|| watcher.downgrade());
    }

    pub(crate) fn remove_sub(&self, id: WatcherId) {
        self.inner.subs.borrow_mut().shift_remove(&id);
    }

    /// Notify every subscriber that the state behind this dep changed.
    ///
    /// Works on a snapshot so that subscribers may subscribe or unsubscribe
    /// (to this or any other dep) while being updated.
    pub fn notify(&self) {
        let snapshot: Vec<Watcher> = self
            .inner
            .subs
            .borrow()
            .values()
            .filter_map(Watcher::upgrade)
            .collect();

        tracing::trace!(dep = self.inner.id.raw(), subscribers = snapshot.len(), "notify");

        for watcher in snapshot {
            watcher.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Check whether `id` is subscribed to this dep.
    pub fn has_subscriber(&self, id: WatcherId) -> bool {
        self.inner.subs.borrow().contains_key(&id)
    }

    /// Subscriber ids in notification order.
    pub fn subscriber_ids(&self) -> Vec<WatcherId> {
        self.inner.subs.borrow().keys().copied().collect()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Dep {}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
