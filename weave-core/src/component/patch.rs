//! Reconciliation
//!
//! The reactive core does not diff trees itself. After every render it hands
//! the previous and the new tree to the installed [`Reconciler`], which is
//! expected to call the component hooks in [`hooks`](super::hooks) as it
//! creates, patches and removes placeholder nodes.
//!
//! [`TreePatcher`] is the built-in reconciler. It matches children by
//! position and has no rendering target; it exists so that component trees
//! can be mounted, updated and torn down without a host renderer.

use super::hooks;
use super::vnode::VNode;

/// Applies a newly rendered tree.
pub trait Reconciler {
    /// Patch `old` into `new`.
    ///
    /// `old == None` is the initial render and `new == None` removes `old`.
    /// `placeholder` is the component node the tree is rendered for, or
    /// `None` for a root instance.
    fn patch(&self, old: Option<&VNode>, new: Option<&VNode>, placeholder: Option<&VNode>);
}

/// Positional tree patcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreePatcher;

impl Reconciler for TreePatcher {
    fn patch(&self, old: Option<&VNode>, new: Option<&VNode>, placeholder: Option<&VNode>) {
        let Some(new) = new else {
            if let Some(old) = old {
                invoke_destroy_hook(old);
            }
            return;
        };

        let mut inserted = Vec::new();
        let initial = match old {
            None => {
                create_elm(new, &mut inserted);
                true
            }
            Some(old) if same_vnode(old, new) => {
                patch_vnode(old, new, &mut inserted);
                false
            }
            Some(old) => {
                create_elm(new, &mut inserted);
                invoke_destroy_hook(old);
                false
            }
        };

        match placeholder {
            // A child's first tree is inserted together with the parent's.
            Some(placeholder) if initial => placeholder.set_pending_insert(inserted),
            _ => {
                for vnode in &inserted {
                    hooks::insert(vnode);
                }
            }
        }
    }
}

/// Whether `b` can be patched in place of `a`.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    let same_factory = match (a.async_factory(), b.async_factory()) {
        (Some(x), Some(y)) => x.ptr_eq(y),
        (None, None) => true,
        _ => false,
    };
    a.key() == b.key()
        && a.tag() == b.tag()
        && a.is_component() == b.is_component()
        && a.text_content().is_some() == b.text_content().is_some()
        && same_factory
}

fn create_elm(vnode: &VNode, inserted: &mut Vec<VNode>) {
    if create_component(vnode, inserted) {
        return;
    }
    for child in vnode.children() {
        create_elm(child, inserted);
    }
}

fn create_component(vnode: &VNode, inserted: &mut Vec<VNode>) -> bool {
    if !vnode.is_component() {
        return false;
    }
    hooks::init(vnode);
    if vnode.component_instance().is_none() {
        return false;
    }
    inserted.extend(vnode.take_pending_insert());
    inserted.push(vnode.clone());
    true
}

fn patch_vnode(old: &VNode, vnode: &VNode, inserted: &mut Vec<VNode>) {
    if old.ptr_eq(vnode) {
        return;
    }
    if vnode.is_component() {
        hooks::prepatch(old, vnode);
        return;
    }
    if vnode.text_content().is_some() {
        return;
    }
    update_children(old.children(), vnode.children(), inserted);
}

fn update_children(old: &[VNode], new: &[VNode], inserted: &mut Vec<VNode>) {
    for index in 0..old.len().max(new.len()) {
        match (old.get(index), new.get(index)) {
            (Some(a), Some(b)) if same_vnode(a, b) => patch_vnode(a, b, inserted),
            (Some(a), Some(b)) => {
                create_elm(b, inserted);
                invoke_destroy_hook(a);
            }
            (None, Some(b)) => create_elm(b, inserted),
            (Some(a), None) => invoke_destroy_hook(a),
            (None, None) => {}
        }
    }
}

fn invoke_destroy_hook(vnode: &VNode) {
    if vnode.is_component() {
        hooks::destroy(vnode);
    }
    for child in vnode.children() {
        invoke_destroy_hook(child);
    }
}
