//! Building component placeholder nodes.

use super::async_factory::{resolve_async_component, AsyncFactory};
use super::definition::ComponentDef;
use super::instance::Instance;
use super::vnode::{AsyncMeta, ComponentData, ComponentOptions, VNode};

/// What a render function asks to instantiate.
#[derive(Clone, Debug)]
pub enum ComponentSource {
    Def(ComponentDef),
    Async(AsyncFactory),
}

impl From<ComponentDef> for ComponentSource {
    fn from(def: ComponentDef) -> Self {
        ComponentSource::Def(def)
    }
}

impl From<&ComponentDef> for ComponentSource {
    fn from(def: &ComponentDef) -> Self {
        ComponentSource::Def(def.clone())
    }
}

impl From<AsyncFactory> for ComponentSource {
    fn from(factory: AsyncFactory) -> Self {
        ComponentSource::Async(factory)
    }
}

impl From<&AsyncFactory> for ComponentSource {
    fn from(factory: &AsyncFactory) -> Self {
        ComponentSource::Async(factory.clone())
    }
}

/// Build the placeholder node for a child component rendered by `context`.
///
/// An async factory that has not produced a definition yet yields an empty
/// placeholder that remembers everything needed to build the real node
/// once `context` re-renders.
pub fn create_component(
    source: impl Into<ComponentSource>,
    data: ComponentData,
    context: &Instance,
    children: Vec<VNode>,
    tag: Option<&str>,
) -> VNode {
    let (def, async_factory) = match source.into() {
        ComponentSource::Def(def) => (def, None),
        ComponentSource::Async(factory) => match resolve_async_component(&factory, context) {
            Some(def) => (def, Some(factory)),
            None => {
                let meta = AsyncMeta {
                    data,
                    context: context.downgrade(),
                    children,
                    tag: tag.map(str::to_owned),
                };
                return VNode::async_placeholder(factory, meta);
            }
        },
    };

    let ComponentData { key, props, on } = data;
    // Abstract components keep no node data of their own.
    let key = if def.is_abstract() { None } else { key };

    let node_tag = match def.name().or(tag) {
        Some(name) => format!("component-{}-{}", def.cid(), name),
        None => format!("component-{}", def.cid()),
    };

    let options = ComponentOptions {
        ctor: def,
        props_data: props,
        listeners: on,
        children,
        tag: tag.map(str::to_owned),
    };
    VNode::component(node_tag, key, context, options, async_factory)
}

/// The first child that is a component placeholder or an unresolved async
/// component.
pub fn first_component_child(children: &[VNode]) -> Option<VNode> {
    children
        .iter()
        .find(|child| child.is_component() || child.is_async_placeholder())
        .cloned()
}
