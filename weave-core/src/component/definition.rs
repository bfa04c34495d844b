//! Component definitions.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::instance::Instance;
use super::vnode::VNode;

/// Lifecycle points at which a definition can run hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hook::Created => "created",
            Hook::BeforeMount => "beforeMount",
            Hook::Mounted => "mounted",
            Hook::BeforeUpdate => "beforeUpdate",
            Hook::Updated => "updated",
            Hook::Activated => "activated",
            Hook::Deactivated => "deactivated",
            Hook::BeforeDestroy => "beforeDestroy",
            Hook::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type RenderFn = Rc<dyn Fn(&Instance) -> VNode>;
pub type HookFn = Rc<dyn Fn(&Instance)>;

struct DefInner {
    cid: u64,
    name: Option<String>,
    is_abstract: bool,
    render: RenderFn,
    hooks: HashMap<Hook, Vec<HookFn>>,
}

/// An immutable component definition. Cloning shares it.
#[derive(Clone)]
pub struct ComponentDef {
    inner: Rc<DefInner>,
}

impl ComponentDef {
    pub fn builder() -> ComponentDefBuilder {
        ComponentDefBuilder::default()
    }

    /// Unique id of the definition.
    pub fn cid(&self) -> u64 {
        self.inner.cid
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Abstract components are skipped when linking parents to children.
    pub fn is_abstract(&self) -> bool {
        self.inner.is_abstract
    }

    pub(crate) fn render_fn(&self) -> &RenderFn {
        &self.inner.render
    }

    pub(crate) fn hooks(&self, hook: Hook) -> &[HookFn] {
        self.inner.hooks.get(&hook).map_or(&[], Vec::as_slice)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ComponentDef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("cid", &self.inner.cid)
            .field("name", &self.inner.name)
            .field("abstract", &self.inner.is_abstract)
            .finish()
    }
}

/// Builder for [`ComponentDef`].
#[derive(Default)]
pub struct ComponentDefBuilder {
    name: Option<String>,
    is_abstract: bool,
    render: Option<RenderFn>,
    hooks: HashMap<Hook, Vec<HookFn>>,
}

impl ComponentDefBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn abstract_component(mut self, is_abstract: bool) -> Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&Instance) -> VNode + 'static,
    {
        self.render = Some(Rc::new(render));
        self
    }

    /// Append a hook. Hooks for the same point run in registration order.
    pub fn hook<F>(mut self, hook: Hook, f: F) -> Self
    where
        F: Fn(&Instance) + 'static,
    {
        self.hooks.entry(hook).or_default().push(Rc::new(f));
        self
    }

    pub fn build(self) -> ComponentDef {
        static NEXT_CID: AtomicU64 = AtomicU64::new(1);

        ComponentDef {
            inner: Rc::new(DefInner {
                cid: NEXT_CID.fetch_add(1, Ordering::Relaxed),
                name: self.name,
                is_abstract: self.is_abstract,
                render: self.render.unwrap_or_else(|| Rc::new(|_| VNode::empty())),
                hooks: self.hooks,
            }),
        }
    }
}
