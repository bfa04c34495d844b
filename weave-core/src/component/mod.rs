//! Components
//!
//! Component definitions, live instances and the virtual nodes that link
//! them, plus the hooks a reconciler calls while patching.
//!
//! # Lifecycle
//!
//! A parent's render function returns placeholder nodes for its child
//! components (see [`create_component`]). While patching, the reconciler
//! calls the component hooks on those placeholders:
//!
//! - [`hooks::init`] creates and mounts the child instance, or reuses a
//!   kept-alive one.
//! - [`hooks::prepatch`] pushes new props, listeners and slot children into
//!   an existing instance.
//! - [`hooks::insert`] marks the instance mounted, or re-activates a
//!   kept-alive instance.
//! - [`hooks::destroy`] tears the instance down, or deactivates a
//!   kept-alive instance.
//!
//! [`KeepAlive`] and [`AsyncFactory`] hook into this flow: the former
//! short-circuits creation and destruction, the latter defers creation
//! until a definition is available.

mod async_factory;
mod create;
mod definition;
pub mod hooks;
mod instance;
mod keep_alive;
pub mod lifecycle;
mod patch;
mod vnode;

pub use async_factory::{
    resolve_async_component, AsyncFactory, AsyncLoad, AsyncOptions, AsyncStatus, LoadFuture, Reject,
    Resolve,
};
pub use create::{create_component, first_component_child, ComponentSource};
pub use definition::{ComponentDef, ComponentDefBuilder, Hook, HookFn, RenderFn};
pub use instance::{Instance, Props, WeakInstance};
pub use keep_alive::{CacheKey, KeepAlive, KeepAliveOptions, Pattern};
pub use patch::{same_vnode, Reconciler, TreePatcher};
pub use vnode::{AsyncMeta, ComponentData, ComponentOptions, Listener, Listeners, VNode};
