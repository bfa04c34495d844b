//! Component Instances
//!
//! An instance is a live component: reactive props, a render watcher that
//! re-renders and re-patches when anything the render read changes, a
//! parent link, and the lifecycle flags the vnode hooks consult.
//!
//! # Ownership
//!
//! Parents own their children (through `children` and through the
//! placeholder vnodes of their rendered tree). Children only hold weak
//! links back to their parent and to their placeholder, so an unmounted
//! tree is freed once its root is dropped. [`Instance::destroy`] releases
//! the rendered tree eagerly.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::definition::{ComponentDef, Hook};
use super::vnode::{Listeners, VNode, WeakVNode};
use crate::reactive::{untracked, ReactiveObject, Traverse, Value, WatchOptions, Watcher, WatcherOwner};
use crate::runtime::Runtime;

thread_local! {
    static ACTIVE_INSTANCE: RefCell<Vec<Instance>> = const { RefCell::new(Vec::new()) };
}

/// The instance whose tree is being patched, if any.
pub(crate) fn active_instance() -> Option<Instance> {
    ACTIVE_INSTANCE.with(|stack| stack.borrow().last().cloned())
}

struct ActiveInstanceScope;

impl ActiveInstanceScope {
    fn enter(vm: Instance) -> Self {
        ACTIVE_INSTANCE.with(|stack| stack.borrow_mut().push(vm));
        Self
    }
}

impl Drop for ActiveInstanceScope {
    fn drop(&mut self) {
        ACTIVE_INSTANCE.with(|stack| {
            let popped = stack.borrow_mut().pop();
            debug_assert!(popped.is_some(), "active instance popped while empty");
        });
    }
}

pub(crate) struct InstanceInner {
    uid: u64,
    this: Weak<InstanceInner>,
    def: ComponentDef,
    parent: Option<Weak<InstanceInner>>,
    children: RefCell<Vec<Instance>>,
    props: ReactiveObject,
    listeners: RefCell<Listeners>,
    slot_children: RefCell<Vec<VNode>>,
    parent_vnode: RefCell<Option<WeakVNode>>,
    vnode: RefCell<Option<VNode>>,
    watcher: RefCell<Option<Watcher>>,
    watchers: RefCell<Vec<Watcher>>,
    state: RefCell<Option<Rc<dyn Any>>>,
    is_mounted: Cell<bool>,
    is_destroyed: Cell<bool>,
    is_being_destroyed: Cell<bool>,
    inactive: Cell<Option<bool>>,
    direct_inactive: Cell<bool>,
}

impl InstanceInner {
    fn handle(&self) -> Option<Instance> {
        self.this.upgrade().map(|inner| Instance { inner })
    }
}

impl WatcherOwner for InstanceInner {
    fn describe(&self) -> String {
        match self.def.name() {
            Some(name) => format!("<{name}>"),
            None => "<Anonymous>".to_string(),
        }
    }

    fn before_update(&self, _watcher: &Watcher) {
        if self.is_mounted.get() && !self.is_destroyed.get() {
            if let Some(vm) = self.handle() {
                vm.call_hook(Hook::BeforeUpdate);
            }
        }
    }

    fn updated(&self, watcher: &Watcher) {
        let is_render_watcher = self.watcher.borrow().as_ref() == Some(watcher);
        if is_render_watcher && self.is_mounted.get() && !self.is_destroyed.get() {
            if let Some(vm) = self.handle() {
                vm.call_hook(Hook::Updated);
            }
        }
    }
}

/// A live component.
#[derive(Clone)]
pub struct Instance {
    inner: Rc<InstanceInner>,
}

/// A non-owning handle to an [`Instance`].
#[derive(Clone, Default)]
pub struct WeakInstance {
    inner: Weak<InstanceInner>,
}

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.inner.upgrade().map(|inner| Instance { inner })
    }
}

impl fmt::Debug for WeakInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(vm) => write!(f, "WeakInstance({})", vm.uid()),
            None => f.write_str("WeakInstance(dropped)"),
        }
    }
}

impl Instance {
    /// Create a root instance with the given props. Call [`mount`] to
    /// render it.
    ///
    /// [`mount`]: Instance::mount
    pub fn new<I, K, V>(def: &ComponentDef, props: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::create(def, None, None, ReactiveObject::from_iter(props), Listeners::new(), Vec::new())
    }

    /// Create the instance for a component placeholder, linked under
    /// `parent`.
    pub(crate) fn for_vnode(vnode: &VNode, parent: Option<Instance>) -> Option<Self> {
        let options = vnode.component_options()?;
        let props = ReactiveObject::from_iter(
            options
                .props_data
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        Some(Self::create(
            &options.ctor,
            parent,
            Some(vnode.clone()),
            props,
            options.listeners.clone(),
            options.children.clone(),
        ))
    }

    fn create(
        def: &ComponentDef,
        parent: Option<Instance>,
        parent_vnode: Option<VNode>,
        props: ReactiveObject,
        listeners: Listeners,
        slot_children: Vec<VNode>,
    ) -> Self {
        static NEXT_UID: AtomicU64 = AtomicU64::new(0);

        // Abstract ancestors are skipped; abstract components themselves
        // are never listed as children.
        let mut parent = parent;
        if !def.is_abstract() {
            while let Some(p) = parent.clone() {
                match p.parent() {
                    Some(grand) if p.def().is_abstract() => parent = Some(grand),
                    _ => break,
                }
            }
        }

        let inner = Rc::new_cyclic(|this| InstanceInner {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            this: this.clone(),
            def: def.clone(),
            parent: parent.as_ref().map(|p| Rc::downgrade(&p.inner)),
            children: RefCell::new(Vec::new()),
            props,
            listeners: RefCell::new(listeners),
            slot_children: RefCell::new(slot_children),
            parent_vnode: RefCell::new(parent_vnode.as_ref().map(VNode::downgrade)),
            vnode: RefCell::new(None),
            watcher: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
            state: RefCell::new(None),
            is_mounted: Cell::new(false),
            is_destroyed: Cell::new(false),
            is_being_destroyed: Cell::new(false),
            inactive: Cell::new(None),
            direct_inactive: Cell::new(false),
        });
        let vm = Self { inner };

        if let Some(parent) = &parent {
            if !def.is_abstract() {
                parent.inner.children.borrow_mut().push(vm.clone());
            }
        }

        vm.call_hook(Hook::Created);
        vm
    }

    #[cfg(test)]
    pub(crate) fn create_child(def: &ComponentDef, parent: &Instance) -> Self {
        Self::create(
            def,
            Some(parent.clone()),
            None,
            ReactiveObject::new(),
            Listeners::new(),
            Vec::new(),
        )
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn uid(&self) -> u64 {
        self.inner.uid
    }

    pub fn def(&self) -> &ComponentDef {
        &self.inner.def
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.def.name()
    }

    /// `<Name>` or `<Anonymous>`.
    pub fn describe(&self) -> String {
        WatcherOwner::describe(&*self.inner)
    }

    pub fn parent(&self) -> Option<Instance> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Instance { inner })
    }

    pub fn children(&self) -> Vec<Instance> {
        self.inner.children.borrow().clone()
    }

    /// The reactive props object.
    pub fn props(&self) -> &ReactiveObject {
        &self.inner.props
    }

    /// Read a prop, tracking it.
    pub fn prop(&self, key: &str) -> Option<Value> {
        self.inner.props.get(key)
    }

    /// Children passed by the parent for the default slot.
    pub fn slot_children(&self) -> Vec<VNode> {
        self.inner.slot_children.borrow().clone()
    }

    /// Invoke the parent's listener for `event`. Returns whether one was
    /// registered.
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        let listener = self.inner.listeners.borrow().get(event).cloned();
        match listener {
            Some(listener) => {
                untracked(|| listener(args));
                true
            }
            None => false,
        }
    }

    /// The placeholder vnode this instance renders for.
    pub fn parent_vnode(&self) -> Option<VNode> {
        self.inner.parent_vnode.borrow().as_ref().and_then(WeakVNode::upgrade)
    }

    /// The tree produced by the last render.
    pub fn vnode(&self) -> Option<VNode> {
        self.inner.vnode.borrow().clone()
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.inner.watcher.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed.get()
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.inner.is_being_destroyed.get()
    }

    /// `None` until the instance was first activated or deactivated.
    pub fn inactive(&self) -> Option<bool> {
        self.inner.inactive.get()
    }

    pub fn is_direct_inactive(&self) -> bool {
        self.inner.direct_inactive.get()
    }

    /// Attach arbitrary per-instance state.
    pub fn set_state<T: 'static>(&self, state: Rc<T>) {
        *self.inner.state.borrow_mut() = Some(state);
    }

    /// The state attached with [`set_state`](Self::set_state), if it has
    /// type `T`.
    pub fn state<T: 'static>(&self) -> Option<Rc<T>> {
        let state = self.inner.state.borrow().clone()?;
        state.downcast::<T>().ok()
    }

    /// Watch a value derived from this instance. The watcher is torn down
    /// with the instance.
    pub fn watch<T, G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Watcher
    where
        T: Clone + PartialEq + Traverse + 'static,
        G: FnMut() -> T + 'static,
        C: FnMut(&T, Option<&T>) + 'static,
    {
        let watcher = Watcher::user(getter, callback, options);
        self.inner.watchers.borrow_mut().push(watcher.clone());
        watcher
    }

    /// Run every hook registered for `hook`, without dependency tracking.
    pub fn call_hook(&self, hook: Hook) {
        let handlers = self.inner.def.hooks(hook);
        if handlers.is_empty() {
            return;
        }
        tracing::trace!(uid = self.uid(), hook = %hook, "calling hook");
        untracked(|| {
            for handler in handlers {
                handler(self);
            }
        });
    }

    /// Render and patch for the first time.
    ///
    /// A root instance is marked mounted here. A child instance is marked
    /// mounted when its placeholder is inserted into the parent's tree.
    pub fn mount(&self) -> &Self {
        self.call_hook(Hook::BeforeMount);

        let this: Weak<InstanceInner> = Rc::downgrade(&self.inner);
        let owner: Weak<dyn WatcherOwner> = this.clone();
        let watcher = Watcher::render(owner, move || {
            if let Some(inner) = this.upgrade() {
                let vm = Instance { inner };
                let vnode = vm.render();
                vm.update(vnode);
            }
        });
        *self.inner.watcher.borrow_mut() = Some(watcher);
        tracing::debug!(uid = self.uid(), name = ?self.name(), "mounted instance");

        if self.parent_vnode().is_none() {
            self.inner.is_mounted.set(true);
            self.call_hook(Hook::Mounted);
        }
        self
    }

    fn render(&self) -> VNode {
        let render = self.inner.def.render_fn().clone();
        render(self)
    }

    fn update(&self, vnode: VNode) {
        let prev = self.inner.vnode.replace(Some(vnode.clone()));
        let placeholder = self.parent_vnode();
        let reconciler = Runtime::reconciler();

        let _active = ActiveInstanceScope::enter(self.clone());
        match prev {
            None => reconciler.patch(None, Some(&vnode), placeholder.as_ref()),
            Some(prev) => reconciler.patch(Some(&prev), Some(&vnode), placeholder.as_ref()),
        }
    }

    /// Schedule a re-render regardless of tracked state.
    pub fn force_update(&self) {
        if let Some(watcher) = self.render_watcher() {
            watcher.update();
        }
    }

    /// Tear the instance down: stop its watchers, destroy its rendered
    /// tree and unlink it from its parent.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.is_being_destroyed.get() {
            return;
        }
        self.call_hook(Hook::BeforeDestroy);
        inner.is_being_destroyed.set(true);

        if let Some(parent) = self.parent() {
            if !parent.is_being_destroyed() && !inner.def.is_abstract() {
                parent
                    .inner
                    .children
                    .borrow_mut()
                    .retain(|child| !Rc::ptr_eq(&child.inner, &self.inner));
            }
        }

        if let Some(watcher) = inner.watcher.borrow().as_ref() {
            watcher.teardown();
        }
        for watcher in inner.watchers.borrow_mut().drain(..) {
            watcher.teardown();
        }

        inner.is_destroyed.set(true);
        let tree = inner.vnode.borrow_mut().take();
        Runtime::reconciler().patch(tree.as_ref(), None, None);
        self.call_hook(Hook::Destroyed);

        inner.listeners.borrow_mut().clear();
        inner.parent_vnode.borrow_mut().take();
        tracing::debug!(uid = self.uid(), name = ?self.name(), "destroyed instance");
    }

    pub(crate) fn set_mounted(&self) {
        self.inner.is_mounted.set(true);
    }

    pub(crate) fn set_inactive(&self, inactive: bool) {
        self.inner.inactive.set(Some(inactive));
    }

    pub(crate) fn set_direct_inactive(&self, direct: bool) {
        self.inner.direct_inactive.set(direct);
    }

    pub(crate) fn set_parent_vnode(&self, vnode: &VNode) {
        *self.inner.parent_vnode.borrow_mut() = Some(vnode.downgrade());
    }

    pub(crate) fn replace_slot_children(&self, children: Vec<VNode>) {
        *self.inner.slot_children.borrow_mut() = children;
    }

    pub(crate) fn replace_listeners(&self, listeners: Listeners) {
        *self.inner.listeners.borrow_mut() = listeners;
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("uid", &self.inner.uid)
            .field("name", &self.inner.def.name())
            .field("mounted", &self.inner.is_mounted.get())
            .field("destroyed", &self.inner.is_destroyed.get())
            .field("inactive", &self.inner.inactive.get())
            .finish()
    }
}

/// Props passed to an instance, keyed by name.
pub type Props = IndexMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualHost;
    use crate::reactive::Signal;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Rc<dyn Fn(&Instance)>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |label: &'static str| -> Rc<dyn Fn(&Instance)> {
            let sink = Rc::clone(&sink);
            Rc::new(move |_: &Instance| sink.borrow_mut().push(label.to_string()))
        };
        (log, make)
    }

    #[test]
    fn root_mount_runs_hooks_in_order() {
        let _host = ManualHost::install();
        let (log, hook) = recorder();
        let (created, before, mounted) = (hook("created"), hook("beforeMount"), hook("mounted"));
        let def = ComponentDef::builder()
            .name("root")
            .hook(Hook::Created, move |vm| created(vm))
            .hook(Hook::BeforeMount, move |vm| before(vm))
            .hook(Hook::Mounted, move |vm| mounted(vm))
            .build();

        let vm = Instance::new(&def, [("n", 1)]);
        vm.mount();

        assert!(vm.is_mounted());
        assert_eq!(*log.borrow(), vec!["created", "beforeMount", "mounted"]);
        assert_eq!(vm.describe(), "<root>");
    }

    #[test]
    fn prop_change_rerenders_on_next_tick() {
        let host = ManualHost::install();
        let renders = Rc::new(Cell::new(0));
        let def = {
            let renders = Rc::clone(&renders);
            ComponentDef::builder()
                .render(move |vm| {
                    renders.set(renders.get() + 1);
                    let n = vm.prop("n").and_then(|v| v.as_f64()).unwrap_or_default();
                    VNode::text(n.to_string())
                })
                .build()
        };

        let vm = Instance::new(&def, [("n", 1)]);
        vm.mount();
        assert_eq!(renders.get(), 1);

        vm.props().set("n", 2);
        vm.props().set("n", 3);
        assert_eq!(renders.get(), 1);

        host.run_microtasks();
        assert_eq!(renders.get(), 2);
        assert_eq!(vm.vnode().and_then(|v| v.text_content().map(str::to_owned)), Some("3".into()));
    }

    #[test]
    fn updated_hooks_follow_before_update() {
        let host = ManualHost::install();
        let (log, hook) = recorder();
        let (before, updated) = (hook("beforeUpdate"), hook("updated"));
        let count = Signal::new(0);
        let def = {
            let count = count.clone();
            ComponentDef::builder()
                .render(move |_| VNode::text(count.get().to_string()))
                .hook(Hook::BeforeUpdate, move |vm| before(vm))
                .hook(Hook::Updated, move |vm| updated(vm))
                .build()
        };

        let vm = Instance::new(&def, Props::new());
        vm.mount();
        count.set(1);
        host.run_microtasks();

        assert_eq!(*log.borrow(), vec!["beforeUpdate", "updated"]);
    }

    #[test]
    fn hooks_do_not_track() {
        let outside = Signal::new(0);
        let def = {
            let outside = outside.clone();
            ComponentDef::builder()
                .hook(Hook::BeforeMount, move |_| {
                    outside.get();
                })
                .build()
        };
        let vm = Instance::new(&def, Props::new());

        // Hooks of child instances run while the parent is rendering.
        let observer = {
            let vm = vm.clone();
            Watcher::new(move || vm.call_hook(Hook::BeforeMount), Default::default())
        };
        assert!(observer.dep_ids().is_empty());
        assert_eq!(outside.subscriber_count(), 0);
    }

    #[test]
    fn destroy_tears_down_watchers_once() {
        let host = ManualHost::install();
        let (log, hook) = recorder();
        let (before, destroyed) = (hook("beforeDestroy"), hook("destroyed"));
        let count = Signal::new(0);
        let def = {
            let count = count.clone();
            ComponentDef::builder()
                .render(move |_| VNode::text(count.get().to_string()))
                .hook(Hook::BeforeDestroy, move |vm| before(vm))
                .hook(Hook::Destroyed, move |vm| destroyed(vm))
                .build()
        };

        let vm = Instance::new(&def, Props::new());
        vm.mount();
        let fired = Rc::new(Cell::new(0));
        {
            let count = count.clone();
            let fired = Rc::clone(&fired);
            vm.watch(
                move || count.get(),
                move |_, _| fired.set(fired.get() + 1),
                WatchOptions::default(),
            );
        }
        assert_eq!(count.subscriber_count(), 2);

        vm.destroy();
        vm.destroy();
        assert_eq!(*log.borrow(), vec!["beforeDestroy", "destroyed"]);
        assert_eq!(count.subscriber_count(), 0);
        assert!(vm.vnode().is_none());

        count.set(1);
        host.run_microtasks();
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn emit_calls_parent_listener() {
        let got = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::new();
        {
            let got = Rc::clone(&got);
            listeners.insert(
                "change".to_string(),
                Rc::new(move |args: &[Value]| got.borrow_mut().extend(args.iter().cloned())),
            );
        }
        let def = ComponentDef::builder().build();
        let vm = Instance::create(&def, None, None, ReactiveObject::new(), listeners, Vec::new());

        assert!(vm.emit("change", &[Value::from(7)]));
        assert!(!vm.emit("other", &[]));
        assert_eq!(*got.borrow(), vec![Value::from(7)]);
    }

    #[test]
    fn state_round_trips_by_type() {
        let vm = Instance::new(&ComponentDef::builder().build(), Props::new());
        vm.set_state(Rc::new(5_u32));
        assert_eq!(vm.state::<u32>().as_deref(), Some(&5));
        assert!(vm.state::<String>().is_none());
    }
}
