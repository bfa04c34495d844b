//! Virtual Nodes
//!
//! A vnode is the output of a render function. Plain element and text nodes
//! only carry structure. Component placeholder nodes stand in for a child
//! component in the parent's tree; the reconciler creates the child
//! instance from their [`ComponentOptions`] and records it on the node.
//!
//! Nodes are reference counted. The instance slot and the keep-alive and
//! pending-insert bookkeeping are interior-mutable because the reconciler
//! updates them after the tree was built.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::async_factory::AsyncFactory;
use super::definition::ComponentDef;
use super::instance::{Instance, WeakInstance};
use crate::reactive::Value;

/// A listener registered by a parent on a child component.
pub type Listener = Rc<dyn Fn(&[Value])>;

/// Listeners keyed by event name.
pub type Listeners = IndexMap<String, Listener>;

/// Data a parent passes to a child component.
#[derive(Clone, Default)]
pub struct ComponentData {
    pub key: Option<String>,
    pub props: IndexMap<String, Value>,
    pub on: Listeners,
}

impl ComponentData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn on<F>(mut self, event: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&[Value]) + 'static,
    {
        self.on.insert(event.into(), Rc::new(listener));
        self
    }
}

impl fmt::Debug for ComponentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentData")
            .field("key", &self.key)
            .field("props", &self.props)
            .field("on", &self.on.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// What a component placeholder needs to create or update its instance.
#[derive(Clone)]
pub struct ComponentOptions {
    pub ctor: ComponentDef,
    pub props_data: IndexMap<String, Value>,
    pub listeners: Listeners,
    pub children: Vec<VNode>,
    pub tag: Option<String>,
}

/// Everything needed to re-create an async component once it resolves.
#[derive(Clone)]
pub struct AsyncMeta {
    pub data: ComponentData,
    pub context: WeakInstance,
    pub children: Vec<VNode>,
    pub tag: Option<String>,
}

#[derive(Default)]
pub(crate) struct VNodeData {
    keep_alive: Cell<bool>,
    pending_insert: RefCell<Vec<VNode>>,
}

struct VNodeInner {
    tag: Option<String>,
    key: Option<String>,
    text: Option<String>,
    children: Vec<VNode>,
    data: VNodeData,
    context: Option<WeakInstance>,
    component_options: Option<ComponentOptions>,
    component_instance: RefCell<Option<Instance>>,
    async_factory: Option<AsyncFactory>,
    async_meta: Option<AsyncMeta>,
}

impl VNodeInner {
    fn blank() -> Self {
        Self {
            tag: None,
            key: None,
            text: None,
            children: Vec::new(),
            data: VNodeData::default(),
            context: None,
            component_options: None,
            component_instance: RefCell::new(None),
            async_factory: None,
            async_meta: None,
        }
    }
}

/// A node of a rendered tree.
#[derive(Clone)]
pub struct VNode {
    inner: Rc<VNodeInner>,
}

impl VNode {
    fn from_inner(inner: VNodeInner) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }

    /// A node that renders nothing.
    pub fn empty() -> Self {
        Self::from_inner(VNodeInner::blank())
    }

    pub fn element(tag: impl Into<String>, children: Vec<VNode>) -> Self {
        Self::from_inner(VNodeInner {
            tag: Some(tag.into()),
            children,
            ..VNodeInner::blank()
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_inner(VNodeInner {
            text: Some(text.into()),
            ..VNodeInner::blank()
        })
    }

    pub(crate) fn component(
        tag: String,
        key: Option<String>,
        context: &Instance,
        options: ComponentOptions,
        async_factory: Option<AsyncFactory>,
    ) -> Self {
        Self::from_inner(VNodeInner {
            tag: Some(tag),
            key,
            context: Some(context.downgrade()),
            component_options: Some(options),
            async_factory,
            ..VNodeInner::blank()
        })
    }

    pub(crate) fn async_placeholder(factory: AsyncFactory, meta: AsyncMeta) -> Self {
        Self::from_inner(VNodeInner {
            context: Some(meta.context.clone()),
            async_factory: Some(factory),
            async_meta: Some(meta),
            ..VNodeInner::blank()
        })
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.tag.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    pub fn text_content(&self) -> Option<&str> {
        self.inner.text.as_deref()
    }

    pub fn children(&self) -> &[VNode] {
        &self.inner.children
    }

    /// The instance that rendered this node.
    pub fn context(&self) -> Option<Instance> {
        self.inner.context.as_ref().and_then(WeakInstance::upgrade)
    }

    pub fn component_options(&self) -> Option<&ComponentOptions> {
        self.inner.component_options.as_ref()
    }

    pub fn is_component(&self) -> bool {
        self.inner.component_options.is_some()
    }

    /// The child instance behind a component placeholder.
    pub fn component_instance(&self) -> Option<Instance> {
        self.inner.component_instance.borrow().clone()
    }

    pub(crate) fn set_component_instance(&self, instance: Option<Instance>) {
        *self.inner.component_instance.borrow_mut() = instance;
    }

    pub fn async_factory(&self) -> Option<&AsyncFactory> {
        self.inner.async_factory.as_ref()
    }

    pub fn async_meta(&self) -> Option<&AsyncMeta> {
        self.inner.async_meta.as_ref()
    }

    /// An empty node standing in for an async component that has not
    /// resolved yet.
    pub fn is_async_placeholder(&self) -> bool {
        self.inner.tag.is_none() && self.inner.async_factory.is_some()
    }

    /// Set by keep-alive on nodes whose instance it caches.
    pub fn is_keep_alive(&self) -> bool {
        self.inner.data.keep_alive.get()
    }

    pub(crate) fn set_keep_alive(&self, keep_alive: bool) {
        self.inner.data.keep_alive.set(keep_alive);
    }

    pub(crate) fn set_pending_insert(&self, queue: Vec<VNode>) {
        *self.inner.data.pending_insert.borrow_mut() = queue;
    }

    pub(crate) fn take_pending_insert(&self) -> Vec<VNode> {
        std::mem::take(&mut *self.inner.data.pending_insert.borrow_mut())
    }

    pub(crate) fn downgrade(&self) -> WeakVNode {
        WeakVNode(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Clone)]
pub(crate) struct WeakVNode(Weak<VNodeInner>);

impl WeakVNode {
    pub(crate) fn upgrade(&self) -> Option<VNode> {
        self.0.upgrade().map(|inner| VNode { inner })
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        if let Some(tag) = &self.inner.tag {
            s.field("tag", tag);
        }
        if let Some(key) = &self.inner.key {
            s.field("key", key);
        }
        if let Some(text) = &self.inner.text {
            s.field("text", text);
        }
        if !self.inner.children.is_empty() {
            s.field("children", &self.inner.children);
        }
        if self.is_async_placeholder() {
            s.field("async", &true);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_structure() {
        let tree = VNode::element("ul", vec![VNode::element("li", vec![VNode::text("a")])]);
        assert_eq!(tree.tag(), Some("ul"));
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].children()[0].text_content(), Some("a"));
        assert!(!tree.is_component());
        assert!(!tree.is_async_placeholder());
    }

    #[test]
    fn clones_share_bookkeeping() {
        let node = VNode::element("div", Vec::new());
        let other = node.clone();
        node.set_keep_alive(true);
        assert!(other.is_keep_alive());
        assert!(other.ptr_eq(&node));
        assert!(!VNode::empty().ptr_eq(&node));
    }
}
