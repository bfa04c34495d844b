//! Watcher Implementation
//!
//! A Watcher is a tracked computation: a render function, a user-defined
//! watch expression or a lazily evaluated computed value. It re-runs when
//! any dep it read during its last evaluation is notified.
//!
//! # How Watchers Work
//!
//! 1. Evaluation runs the getter inside a [`TrackingScope`], so every dep
//!    read is recorded in `new_deps` exactly once.
//!
//! 2. After evaluation, deps that were read last time but not this time are
//!    unsubscribed and `new_deps` becomes the tracked set.
//!
//! 3. On notification, lazy watchers only mark themselves dirty, sync
//!    watchers run immediately and everything else is handed to the
//!    scheduler.
//!
//! Watcher ids increase monotonically with creation order. The scheduler
//! relies on this: parents render before children and a component's user
//! watchers run before its render watcher.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::context::{untracked, TrackingScope};
use super::dep::{Dep, DepId};
use super::traverse::{traverse, Traverse};
use crate::diagnostics::{self, Diagnostic};
use crate::scheduler;

/// Unique, monotonically increasing identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watcher#{}", self.0)
    }
}

/// The component side of a render watcher.
///
/// The scheduler calls back into the owner around scheduled runs so that
/// `beforeUpdate` and `updated` hooks fire at the right time.
pub trait WatcherOwner {
    /// Human-readable name used in diagnostics.
    fn describe(&self) -> String;

    /// Called right before a scheduled run of the owner's render watcher.
    fn before_update(&self, watcher: &Watcher);

    /// Called after the flush that ran `watcher` completed.
    fn updated(&self, watcher: &Watcher);
}

/// Flags for a plain watcher.
#[derive(Debug, Clone, Default)]
pub struct WatcherOptions {
    user: bool,
    lazy: bool,
    sync: bool,
    label: Option<Cow<'static, str>>,
}

impl WatcherOptions {
    /// Mark the watcher as user-defined (affects diagnostics only).
    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    /// Do not evaluate on creation; mark dirty on notification instead of
    /// scheduling.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Run synchronously on notification instead of going through the
    /// scheduler.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Name reported in diagnostics.
    pub fn label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Options for [`Watcher::user`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Traverse the watched value so nested changes trigger the callback.
    pub deep: bool,
    /// Run on notification instead of at the next flush.
    pub sync: bool,
    /// Invoke the callback once with the initial value.
    pub immediate: bool,
    /// Name reported in diagnostics.
    pub label: Option<Cow<'static, str>>,
}

type Getter = Box<dyn FnMut()>;
type Callback = Box<dyn FnMut()>;

pub(crate) struct WatcherInner {
    id: WatcherId,
    render: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    label: Option<Cow<'static, str>>,
    owner: Option<Weak<dyn WatcherOwner>>,
    active: Cell<bool>,
    dirty: Cell<bool>,
    runs: Cell<u64>,
    deps: RefCell<IndexMap<DepId, Dep>>,
    new_deps: RefCell<IndexMap<DepId, Dep>>,
    getter: RefCell<Getter>,
    callback: RefCell<Option<Callback>>,
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().values() {
            dep.remove_sub(self.id);
        }
    }
}

/// A tracked computation.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher around `getter`.
    ///
    /// Unless the watcher is lazy, the getter runs immediately to establish
    /// the initial dependencies.
    pub fn new<F>(getter: F, options: WatcherOptions) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::build(Box::new(getter), None, options, None, false)
    }

    /// Create a watcher that invokes `callback` after every scheduled re-run.
    pub fn with_callback<F, C>(getter: F, callback: C, options: WatcherOptions) -> Self
    where
        F: FnMut() + 'static,
        C: FnMut() + 'static,
    {
        Self::build(Box::new(getter), Some(Box::new(callback)), options, None, false)
    }

    /// Create the render watcher of a component.
    pub(crate) fn render<F>(owner: Weak<dyn WatcherOwner>, getter: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::build(Box::new(getter), None, WatcherOptions::default(), Some(owner), true)
    }

    /// Watch the value produced by `getter` and call `callback(new, old)`
    /// when it changes.
    ///
    /// The callback also fires when the value is compound (objects and
    /// arrays may have been mutated in place) or when `deep` is set.
    pub fn user<T, G, C>(getter: G, callback: C, options: WatchOptions) -> Self
    where
        T: Clone + PartialEq + Traverse + 'static,
        G: FnMut() -> T + 'static,
        C: FnMut(&T, Option<&T>) + 'static,
    {
        let slot: Rc<RefCell<WatchSlot<T>>> = Rc::new(RefCell::new(WatchSlot::default()));
        let deep = options.deep;

        let getter = {
            let slot = Rc::clone(&slot);
            let mut getter = getter;
            move || {
                let value = getter();
                if deep {
                    traverse(&value);
                }
                slot.borrow_mut().latest = Some(value);
            }
        };

        let callback = {
            let slot = Rc::clone(&slot);
            let mut callback = callback;
            move || {
                let fired = {
                    let mut slot = slot.borrow_mut();
                    let Some(value) = slot.latest.take() else {
                        return;
                    };
                    let fire = deep || value.is_compound() || slot.current.as_ref() != Some(&value);
                    let old = slot.current.replace(value.clone());
                    fire.then_some((value, old))
                };
                if let Some((value, old)) = fired {
                    callback(&value, old.as_ref());
                }
            }
        };

        let mut watcher_options = WatcherOptions::default().user(true).sync(options.sync);
        watcher_options.label = options.label;
        let watcher = Self::build(
            Box::new(getter),
            Some(Box::new(callback)),
            watcher_options,
            None,
            false,
        );

        if options.immediate {
            watcher.invoke_callback();
        } else {
            let mut slot = slot.borrow_mut();
            slot.current = slot.latest.take();
        }

        watcher
    }

    fn build(
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
        owner: Option<Weak<dyn WatcherOwner>>,
        render: bool,
    ) -> Self {
        let lazy = options.lazy;
        let watcher = Self {
            inner: Rc::new(WatcherInner {
                id: WatcherId::next(),
                render,
                user: options.user,
                lazy,
                sync: options.sync,
                label: options.label,
                owner,
                active: Cell::new(true),
                dirty: Cell::new(lazy),
                runs: Cell::new(0),
                deps: RefCell::new(IndexMap::new()),
                new_deps: RefCell::new(IndexMap::new()),
                getter: RefCell::new(getter),
                callback: RefCell::new(callback),
            }),
        };

        if !lazy {
            watcher.get();
        }
        watcher
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<WatcherInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    /// Whether this is a component render watcher.
    pub fn is_render(&self) -> bool {
        self.inner.render
    }

    /// Whether this watcher was created by user code.
    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    /// Whether this watcher is lazily evaluated.
    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    /// Whether this watcher bypasses the scheduler.
    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    /// A lazy watcher that must be re-evaluated before its value is read.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// False once the watcher has been torn down.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of completed evaluations.
    pub fn run_count(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Ids of the deps recorded by the last evaluation.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.deps.borrow().keys().copied().collect()
    }

    /// Name of the computation, for diagnostics.
    pub fn describe(&self) -> String {
        let inner = &self.inner;
        if inner.render {
            if let Some(owner) = self.owner() {
                return format!("render function of {}", owner.describe());
            }
        }
        match &inner.label {
            Some(label) if inner.user => format!("watcher \"{label}\""),
            Some(label) => label.to_string(),
            None => inner.id.to_string(),
        }
    }

    fn owner(&self) -> Option<Rc<dyn WatcherOwner>> {
        self.inner.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Evaluate the getter and re-collect dependencies.
    ///
    /// Returns false when the evaluation was refused because the watcher is
    /// already evaluating further up the stack.
    pub(crate) fn get(&self) -> bool {
        let Ok(mut getter) = self.inner.getter.try_borrow_mut() else {
            diagnostics::report(Diagnostic::ReentrantEvaluation {
                watcher: self.id(),
                target: self.describe(),
            });
            return false;
        };

        let outcome = {
            let _scope = TrackingScope::enter(Some(self.clone()));
            panic::catch_unwind(AssertUnwindSafe(|| getter()))
        };
        drop(getter);

        self.cleanup_deps();
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
        self.inner.runs.set(self.inner.runs.get() + 1);
        true
    }

    /// Record `dep` as read during the current evaluation.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let fresh = {
            let mut new_deps = self.inner.new_deps.borrow_mut();
            if new_deps.contains_key(&id) {
                false
            } else {
                new_deps.insert(id, dep.clone());
                true
            }
        };

        if fresh && !self.inner.deps.borrow().contains_key(&id) {
            dep.add_sub(self);
        }
    }

    fn cleanup_deps(&self) {
        let fresh = std::mem::take(&mut *self.inner.new_deps.borrow_mut());
        let stale = std::mem::replace(&mut *self.inner.deps.borrow_mut(), fresh);

        let deps = self.inner.deps.borrow();
        for (id, dep) in stale {
            if !deps.contains_key(&id) {
                dep.remove_sub(self.id());
            }
        }
    }

    /// React to a notification from one of the tracked deps.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.set(true);
        } else if self.inner.sync {
            self.run();
        } else {
            scheduler::queue_watcher(self);
        }
    }

    /// Re-evaluate and perform the watcher's side effect.
    pub fn run(&self) {
        if !self.inner.active.get() {
            return;
        }
        if self.get() {
            self.invoke_callback();
        }
    }

    /// Callbacks may run while another watcher is evaluating; their reads
    /// are not attributed to it.
    fn invoke_callback(&self) {
        if let Ok(mut callback) = self.inner.callback.try_borrow_mut() {
            if let Some(callback) = callback.as_mut() {
                untracked(|| callback());
            }
        }
    }

    /// Evaluate a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) {
        if self.get() {
            self.inner.dirty.set(false);
        }
    }

    /// Make the active tracking target depend on everything this watcher
    /// depends on.
    pub fn depend(&self) {
        let deps: Vec<Dep> = self.inner.deps.borrow().values().cloned().collect();
        for dep in deps {
            dep.track();
        }
    }

    /// Unsubscribe from every dep. The watcher never runs again.
    pub fn teardown(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in deps.values() {
            dep.remove_sub(self.id());
        }
        self.inner.new_deps.borrow_mut().clear();
    }

    pub(crate) fn before_run(&self) {
        if self.inner.render {
            if let Some(owner) = self.owner() {
                owner.before_update(self);
            }
        }
    }

    pub(crate) fn after_flush(&self) {
        if self.inner.render {
            if let Some(owner) = self.owner() {
                owner.updated(self);
            }
        }
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Watcher {}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("render", &self.inner.render)
            .field("user", &self.inner.user)
            .field("lazy", &self.inner.lazy)
            .field("sync", &self.inner.sync)
            .field("deps", &self.inner.deps.borrow().len())
            .field("active", &self.inner.active.get())
            .finish()
    }
}

struct WatchSlot<T> {
    current: Option<T>,
    latest: Option<T>,
}

impl<T> Default for WatchSlot<T> {
    fn default() -> Self {
        Self {
            current: None,
            latest: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    #[test]
    fn watcher_ids_increase() {
        let w1 = Watcher::new(|| {}, WatcherOptions::default());
        let w2 = Watcher::new(|| {}, WatcherOptions::default());
        assert!(w1.id() < w2.id());
    }

    #[test]
    fn watcher_runs_on_creation_unless_lazy() {
        let eager = Watcher::new(|| {}, WatcherOptions::default());
        let lazy = Watcher::new(|| {}, WatcherOptions::default().lazy(true));

        assert_eq!(eager.run_count(), 1);
        assert_eq!(lazy.run_count(), 0);
        assert!(lazy.is_dirty());
    }

    #[test]
    fn stale_deps_are_dropped() {
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);

        let watcher = {
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            Watcher::new(
                move || {
                    if flag.get() {
                        a.get();
                    } else {
                        b.get();
                    }
                },
                WatcherOptions::default().sync(true),
            )
        };

        assert!(a.dep().has_subscriber(watcher.id()));
        assert!(!b.dep().has_subscriber(watcher.id()));

        flag.set(false);
        assert!(!a.dep().has_subscriber(watcher.id()));
        assert!(b.dep().has_subscriber(watcher.id()));
        assert_eq!(watcher.dep_ids().len(), 2);
    }

    #[test]
    fn lazy_watcher_only_marks_dirty() {
        let source = Signal::new(1);
        let watcher = {
            let source = source.clone();
            Watcher::new(
                move || {
                    source.get();
                },
                WatcherOptions::default().lazy(true),
            )
        };

        watcher.evaluate();
        assert!(!watcher.is_dirty());

        source.set(2);
        assert!(watcher.is_dirty());
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn teardown_unsubscribes_everything() {
        let source = Signal::new(0);
        let watcher = {
            let source = source.clone();
            Watcher::new(
                move || {
                    source.get();
                },
                WatcherOptions::default().sync(true),
            )
        };
        assert_eq!(source.dep().subscriber_count(), 1);

        watcher.teardown();
        assert_eq!(source.dep().subscriber_count(), 0);
        assert!(!watcher.is_active());

        watcher.run();
        assert_eq!(watcher.run_count(), 1);
    }

    #[test]
    fn user_watcher_reports_new_and_old() {
        let source = Signal::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _watcher = {
            let source = source.clone();
            let seen = Rc::clone(&seen);
            Watcher::user(
                move || source.get(),
                move |new: &i32, old: Option<&i32>| seen.borrow_mut().push((*new, old.copied())),
                WatchOptions {
                    sync: true,
                    ..WatchOptions::default()
                },
            )
        };

        source.set(2);
        source.set(3);
        assert_eq!(*seen.borrow(), vec![(2, Some(1)), (3, Some(2))]);
    }

    #[test]
    fn user_watcher_skips_unchanged_values() {
        let source = Signal::new(4);
        let calls = Rc::new(Cell::new(0));

        let watcher = {
            let source = source.clone();
            let calls = Rc::clone(&calls);
            Watcher::user(
                move || source.get() % 2,
                move |_: &i32, _: Option<&i32>| calls.set(calls.get() + 1),
                WatchOptions {
                    sync: true,
                    ..WatchOptions::default()
                },
            )
        };

        source.set(6);
        assert_eq!(watcher.run_count(), 2);
        assert_eq!(calls.get(), 0);

        source.set(7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn immediate_user_watcher_fires_with_no_old_value() {
        let source = Signal::new(String::from("a"));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _watcher = {
            let source = source.clone();
            let seen = Rc::clone(&seen);
            Watcher::user(
                move || source.get(),
                move |new: &String, old: Option<&String>| {
                    seen.borrow_mut().push((new.clone(), old.cloned()))
                },
                WatchOptions {
                    immediate: true,
                    sync: true,
                    ..WatchOptions::default()
                },
            )
        };

        assert_eq!(*seen.borrow(), vec![(String::from("a"), None)]);
    }

    #[test]
    fn sync_self_trigger_is_refused() {
        let source = Signal::new(0);
        let watcher = {
            let source = source.clone();
            Watcher::new(
                move || {
                    let value = source.get();
                    if value < 3 {
                        source.set(value + 1);
                    }
                },
                WatcherOptions::default().sync(true),
            )
        };

        assert_eq!(watcher.run_count(), 1);
        assert_eq!(source.get_untracked(), 1);
    }

    #[test]
    fn describe_uses_label() {
        let watcher = Watcher::new(
            || {},
            WatcherOptions::default().user(true).label("items.length"),
        );
        assert_eq!(watcher.describe(), "watcher \"items.length\"");
    }
}
