//! Async Component Resolution
//!
//! An [`AsyncFactory`] produces a component definition some time after it is
//! first rendered. Rendering an unresolved factory yields an empty
//! placeholder; the instances that rendered it are remembered and forced to
//! re-render once the factory settles.
//!
//! # States
//!
//! ```text
//! Pending ──► Loading ──► Resolved
//!    │           │
//!    └───────────┴──────► Errored
//! ```
//!
//! The factory's load function runs exactly once, on the first render.
//! It receives a [`Resolve`] and a [`Reject`] handle; each takes effect at
//! most once. A settle that happens while the load function is still
//! running does not force a re-render, the caller simply sees the result.
//!
//! The advanced form ([`AsyncOptions`]) adds a loading component shown
//! after `delay`, an error component shown after rejection and a timeout
//! that rejects a load which has not resolved in time.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use indexmap::IndexMap;

use super::definition::ComponentDef;
use super::instance::{Instance, WeakInstance};
use crate::diagnostics::{self, Diagnostic};
use crate::runtime::Runtime;

/// A future that yields a component definition or a rejection reason.
pub type LoadFuture = LocalBoxFuture<'static, Result<ComponentDef, String>>;

type LoadFn = Box<dyn FnOnce(Resolve, Reject) -> AsyncLoad>;

/// What a factory's load function hands back.
pub enum AsyncLoad {
    /// The load function keeps the handles and settles through them.
    Deferred,
    /// Settle with the output of this future.
    Future(LoadFuture),
    /// A future plus loading / error components and timing.
    Advanced(AsyncOptions),
}

impl fmt::Debug for AsyncLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsyncLoad::Deferred => f.write_str("Deferred"),
            AsyncLoad::Future(_) => f.write_str("Future(..)"),
            AsyncLoad::Advanced(options) => f.debug_tuple("Advanced").field(options).finish(),
        }
    }
}

/// The advanced async component form.
pub struct AsyncOptions {
    pub component: LoadFuture,
    /// Rendered while loading, once `delay` has passed.
    pub loading: Option<ComponentDef>,
    /// Rendered after a rejection or timeout.
    pub error: Option<ComponentDef>,
    /// Defaults to the runtime's `async_loading_delay_ms`. Zero shows the
    /// loading component immediately.
    pub delay: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl AsyncOptions {
    pub fn new<F>(component: F) -> Self
    where
        F: Future<Output = Result<ComponentDef, String>> + 'static,
    {
        Self {
            component: component.boxed_local(),
            loading: None,
            error: None,
            delay: None,
            timeout: None,
        }
    }

    pub fn loading(mut self, def: ComponentDef) -> Self {
        self.loading = Some(def);
        self
    }

    pub fn error(mut self, def: ComponentDef) -> Self {
        self.error = Some(def);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for AsyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOptions")
            .field("loading", &self.loading)
            .field("error", &self.error)
            .field("delay", &self.delay)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Where a factory is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    Pending,
    Loading,
    Resolved,
    Errored,
}

#[derive(Default)]
struct FactoryState {
    resolved: Option<ComponentDef>,
    /// Set on rejection when an error component exists.
    error: bool,
    rejected: bool,
    loading: bool,
    error_comp: Option<ComponentDef>,
    loading_comp: Option<ComponentDef>,
    /// `Some` once the load function has been started.
    contexts: Option<IndexMap<u64, WeakInstance>>,
}

impl FactoryState {
    fn waiting(&self) -> Vec<Instance> {
        self.contexts
            .iter()
            .flat_map(IndexMap::values)
            .filter_map(WeakInstance::upgrade)
            .collect()
    }
}

struct FactoryInner {
    id: u64,
    label: Option<String>,
    load: RefCell<Option<LoadFn>>,
    /// True while the load function is running.
    sync: Cell<bool>,
    state: RefCell<FactoryState>,
}

impl FactoryInner {
    fn describe(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("async#{}", self.id),
        }
    }
}

/// A component that becomes available later. Cloning shares the factory.
#[derive(Clone)]
pub struct AsyncFactory {
    inner: Rc<FactoryInner>,
}

impl AsyncFactory {
    pub fn new<F>(load: F) -> Self
    where
        F: FnOnce(Resolve, Reject) -> AsyncLoad + 'static,
    {
        Self::build(None, Box::new(load))
    }

    /// A factory with a name used in diagnostics.
    pub fn labelled<F>(label: impl Into<String>, load: F) -> Self
    where
        F: FnOnce(Resolve, Reject) -> AsyncLoad + 'static,
    {
        Self::build(Some(label.into()), Box::new(load))
    }

    /// A factory that settles with `future`'s output.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<ComponentDef, String>> + 'static,
    {
        Self::new(move |_, _| AsyncLoad::Future(future.boxed_local()))
    }

    fn build(label: Option<String>, load: LoadFn) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            inner: Rc::new(FactoryInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                label,
                load: RefCell::new(Some(load)),
                sync: Cell::new(false),
                state: RefCell::new(FactoryState::default()),
            }),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    pub fn status(&self) -> AsyncStatus {
        let state = self.inner.state.borrow();
        if state.error {
            AsyncStatus::Errored
        } else if state.resolved.is_some() {
            AsyncStatus::Resolved
        } else if state.rejected {
            AsyncStatus::Errored
        } else if state.loading {
            AsyncStatus::Loading
        } else {
            AsyncStatus::Pending
        }
    }

    /// The resolved definition, if any.
    pub fn resolved(&self) -> Option<ComponentDef> {
        self.inner.state.borrow().resolved.clone()
    }

    /// Number of live instances waiting for this factory to settle.
    pub fn waiting(&self) -> usize {
        self.inner.state.borrow().waiting().len()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AsyncFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFactory")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("status", &self.status())
            .finish()
    }
}

/// Settles a factory with its definition. Only the first call counts.
#[derive(Clone)]
pub struct Resolve {
    factory: Rc<FactoryInner>,
    fired: Rc<Cell<bool>>,
}

impl Resolve {
    pub fn resolve(&self, def: ComponentDef) {
        if self.fired.replace(true) {
            return;
        }
        let factory = &self.factory;
        tracing::debug!(factory = %factory.describe(), component = ?def.name(), "async component resolved");

        let waiting = {
            let mut state = factory.state.borrow_mut();
            state.resolved = Some(def);
            if factory.sync.get() {
                return;
            }
            let waiting = state.waiting();
            if let Some(contexts) = state.contexts.as_mut() {
                contexts.clear();
            }
            waiting
        };
        force_render(&waiting);
    }
}

impl fmt::Debug for Resolve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve")
            .field("factory", &self.factory.describe())
            .field("fired", &self.fired.get())
            .finish()
    }
}

/// Rejects a factory. Only the first call counts.
#[derive(Clone)]
pub struct Reject {
    factory: Rc<FactoryInner>,
    fired: Rc<Cell<bool>>,
}

impl Reject {
    pub fn reject(&self, reason: Option<String>) {
        if self.fired.replace(true) {
            return;
        }
        let factory = &self.factory;
        diagnostics::report(Diagnostic::AsyncComponentRejected {
            factory: factory.describe(),
            reason,
        });

        let waiting = {
            let mut state = factory.state.borrow_mut();
            state.rejected = true;
            if state.error_comp.is_none() {
                return;
            }
            state.error = true;
            tracing::debug!(factory = %factory.describe(), "async component errored");
            if factory.sync.get() {
                return;
            }
            state.waiting()
        };
        force_render(&waiting);
    }
}

impl fmt::Debug for Reject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject")
            .field("factory", &self.factory.describe())
            .field("fired", &self.fired.get())
            .finish()
    }
}

fn force_render(contexts: &[Instance]) {
    for vm in contexts {
        vm.force_update();
    }
}

fn spawn_load(future: LoadFuture, resolve: Resolve, reject: Reject) {
    Runtime::host().spawn_local(Box::pin(async move {
        match future.await {
            Ok(def) => resolve.resolve(def),
            Err(reason) => reject.reject(Some(reason)),
        }
    }));
}

/// The definition to render for `factory` from `context`, starting the load
/// on first use.
///
/// Returns `None` while nothing renderable is available; `context` is then
/// re-rendered when that changes.
pub fn resolve_async_component(factory: &AsyncFactory, context: &Instance) -> Option<ComponentDef> {
    let inner = &factory.inner;
    {
        let mut state = inner.state.borrow_mut();
        if state.error {
            if let Some(error_comp) = &state.error_comp {
                return Some(error_comp.clone());
            }
        }
        if let Some(resolved) = &state.resolved {
            return Some(resolved.clone());
        }
        if state.loading {
            if let Some(loading_comp) = &state.loading_comp {
                return Some(loading_comp.clone());
            }
        }
        if let Some(contexts) = state.contexts.as_mut() {
            contexts.entry(context.uid()).or_insert_with(|| context.downgrade());
            return None;
        }
        state.contexts = Some(IndexMap::from([(context.uid(), context.downgrade())]));
    }

    let load = inner.load.borrow_mut().take()?;
    let resolve = Resolve {
        factory: Rc::clone(inner),
        fired: Rc::new(Cell::new(false)),
    };
    let reject = Reject {
        factory: Rc::clone(inner),
        fired: Rc::new(Cell::new(false)),
    };
    tracing::debug!(factory = %inner.describe(), "loading async component");

    inner.sync.set(true);
    let outcome = load(resolve.clone(), reject.clone());
    match outcome {
        AsyncLoad::Deferred => {}
        AsyncLoad::Future(future) => {
            if inner.state.borrow().resolved.is_none() {
                spawn_load(future, resolve, reject);
            }
        }
        AsyncLoad::Advanced(options) => start_advanced(inner, options, resolve, reject),
    }
    inner.sync.set(false);

    let state = inner.state.borrow();
    if state.loading {
        state.loading_comp.clone()
    } else {
        state.resolved.clone()
    }
}

fn start_advanced(inner: &Rc<FactoryInner>, options: AsyncOptions, resolve: Resolve, reject: Reject) {
    let AsyncOptions {
        component,
        loading,
        error,
        delay,
        timeout,
    } = options;
    spawn_load(component, resolve, reject.clone());

    let host = Runtime::host();
    if let Some(error) = error {
        inner.state.borrow_mut().error_comp = Some(error);
    }

    if let Some(loading) = loading {
        inner.state.borrow_mut().loading_comp = Some(loading);
        match delay {
            Some(delay) if delay.is_zero() => inner.state.borrow_mut().loading = true,
            delay => {
                let delay = delay.unwrap_or_else(|| Duration::from_millis(Runtime::config().async_loading_delay_ms));
                let factory = Rc::clone(inner);
                host.set_timeout(
                    delay,
                    Box::new(move || {
                        let waiting = {
                            let mut state = factory.state.borrow_mut();
                            if state.resolved.is_some() || state.error {
                                return;
                            }
                            state.loading = true;
                            state.waiting()
                        };
                        tracing::debug!(factory = %factory.describe(), "async component loading");
                        force_render(&waiting);
                    }),
                );
            }
        }
    }

    if let Some(timeout) = timeout {
        let factory = Rc::clone(inner);
        host.set_timeout(
            timeout,
            Box::new(move || {
                if factory.state.borrow().resolved.is_none() {
                    reject.reject(Some(format!("timeout ({}ms)", timeout.as_millis())));
                }
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{create_component, ComponentData, VNode};
    use crate::host::{when_set, ManualHost};
    use crate::reactive::Value;

    /// A mounted root that renders `factory` and counts its renders.
    fn render_host(factory: &AsyncFactory) -> (Instance, Rc<Cell<u32>>) {
        let renders = Rc::new(Cell::new(0));
        let count = Rc::clone(&renders);
        let factory = factory.clone();
        let def = ComponentDef::builder()
            .name("host")
            .render(move |vm| {
                count.set(count.get() + 1);
                let child = create_component(&factory, ComponentData::new(), vm, Vec::new(), None);
                VNode::element("div", vec![child])
            })
            .build();
        let vm = Instance::new(&def, Vec::<(String, Value)>::new());
        vm.mount();
        (vm, renders)
    }

    fn child_name(vm: &Instance) -> Option<String> {
        vm.children().first().and_then(|c| c.name().map(str::to_owned))
    }

    #[test]
    fn future_resolution_forces_one_rerender() {
        let host = ManualHost::install();
        let ready = Rc::new(Cell::new(false));
        let child = ComponentDef::builder().name("child").build();
        let factory = {
            let ready = Rc::clone(&ready);
            let child = child.clone();
            AsyncFactory::from_future(async move {
                when_set(ready).await;
                Ok(child)
            })
        };

        let (vm, renders) = render_host(&factory);
        host.run_microtasks();
        assert_eq!(factory.status(), AsyncStatus::Pending);
        assert_eq!(renders.get(), 1);
        assert!(vm.children().is_empty());

        ready.set(true);
        host.run_microtasks();
        assert_eq!(factory.status(), AsyncStatus::Resolved);
        assert_eq!(renders.get(), 2);
        assert_eq!(child_name(&vm).as_deref(), Some("child"));
        assert_eq!(factory.waiting(), 0);
    }

    #[test]
    fn synchronous_resolve_renders_without_forcing() {
        let host = ManualHost::install();
        let child = ComponentDef::builder().name("child").build();
        let factory = {
            let child = child.clone();
            AsyncFactory::new(move |resolve, _| {
                resolve.resolve(child);
                AsyncLoad::Deferred
            })
        };

        let (vm, renders) = render_host(&factory);
        host.run_microtasks();
        assert_eq!(renders.get(), 1);
        assert_eq!(child_name(&vm).as_deref(), Some("child"));
    }

    #[test]
    fn load_runs_once_and_contexts_are_deduplicated() {
        let _host = ManualHost::install();
        let calls = Rc::new(Cell::new(0));
        let factory = {
            let calls = Rc::clone(&calls);
            AsyncFactory::new(move |_, _| {
                calls.set(calls.get() + 1);
                AsyncLoad::Deferred
            })
        };
        let a = Instance::new(&ComponentDef::builder().build(), Vec::<(String, Value)>::new());
        let b = Instance::new(&ComponentDef::builder().build(), Vec::<(String, Value)>::new());

        assert!(resolve_async_component(&factory, &a).is_none());
        assert!(resolve_async_component(&factory, &a).is_none());
        assert!(resolve_async_component(&factory, &b).is_none());
        assert_eq!(calls.get(), 1);
        assert_eq!(factory.waiting(), 2);
    }

    #[test]
    fn handles_take_effect_once() {
        let _host = ManualHost::install();
        let handles: Rc<RefCell<Option<(Resolve, Reject)>>> = Rc::new(RefCell::new(None));
        let factory = {
            let handles = Rc::clone(&handles);
            AsyncFactory::new(move |resolve, reject| {
                *handles.borrow_mut() = Some((resolve, reject));
                AsyncLoad::Deferred
            })
        };
        let vm = Instance::new(&ComponentDef::builder().build(), Vec::<(String, Value)>::new());
        resolve_async_component(&factory, &vm);

        let (resolve, _) = handles.borrow().clone().unwrap();
        let first = ComponentDef::builder().name("first").build();
        let second = ComponentDef::builder().name("second").build();
        resolve.resolve(first.clone());
        resolve.clone().resolve(second);
        assert_eq!(factory.resolved(), Some(first));
    }

    #[test]
    fn delayed_loading_then_timeout_shows_error_component() {
        let host = ManualHost::install();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        Runtime::set_warn_handler(move |d: &Diagnostic| sink.borrow_mut().push(d.clone()));

        let loading = ComponentDef::builder().name("spinner").build();
        let error = ComponentDef::builder().name("oops").build();
        let factory = {
            let (loading, error) = (loading.clone(), error.clone());
            AsyncFactory::labelled("remote", move |_, _| {
                AsyncLoad::Advanced(
                    AsyncOptions::new(futures_util::future::pending())
                        .loading(loading)
                        .error(error)
                        .timeout(Duration::from_millis(500)),
                )
            })
        };

        let (vm, renders) = render_host(&factory);
        assert_eq!(factory.status(), AsyncStatus::Pending);

        host.advance(Duration::from_millis(200));
        assert_eq!(factory.status(), AsyncStatus::Loading);
        assert_eq!(renders.get(), 2);
        assert_eq!(child_name(&vm).as_deref(), Some("spinner"));

        host.advance(Duration::from_millis(300));
        assert_eq!(factory.status(), AsyncStatus::Errored);
        assert_eq!(renders.get(), 3);
        assert_eq!(child_name(&vm).as_deref(), Some("oops"));
        assert_eq!(
            seen.borrow().as_slice(),
            [Diagnostic::AsyncComponentRejected {
                factory: "remote".into(),
                reason: Some("timeout (500ms)".into()),
            }]
        );
        Runtime::clear_warn_handler();
    }

    #[test]
    fn zero_delay_shows_loading_immediately() {
        let _host = ManualHost::install();
        let loading = ComponentDef::builder().name("spinner").build();
        let factory = {
            let loading = loading.clone();
            AsyncFactory::new(move |_, _| {
                AsyncLoad::Advanced(
                    AsyncOptions::new(futures_util::future::pending())
                        .loading(loading)
                        .delay(Duration::ZERO),
                )
            })
        };
        let vm = Instance::new(&ComponentDef::builder().build(), Vec::<(String, Value)>::new());
        assert_eq!(resolve_async_component(&factory, &vm), Some(loading));
        assert_eq!(factory.status(), AsyncStatus::Loading);
    }

    #[test]
    fn rejection_without_error_component_only_reports() {
        let host = ManualHost::install();
        let factory = AsyncFactory::from_future(async { Err::<ComponentDef, _>("network down".to_string()) });

        let (vm, renders) = render_host(&factory);
        host.run_microtasks();
        assert_eq!(factory.status(), AsyncStatus::Errored);
        assert_eq!(renders.get(), 1);
        assert!(vm.children().is_empty());
    }
}
