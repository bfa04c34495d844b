//! Component vnode hooks.
//!
//! The reconciler calls these on component placeholder nodes:
//!
//! - [`init`] when a placeholder is created,
//! - [`prepatch`] when a placeholder is patched against its previous version,
//! - [`insert`] once the whole tree containing it has been patched,
//! - [`destroy`] when the placeholder is removed.

use super::definition::Hook;
use super::instance::{active_instance, Instance};
use super::lifecycle::{activate_child_component, deactivate_child_component, update_child_component};
use super::vnode::VNode;
use crate::scheduler::queue_activated_component;

/// Create and mount the child instance, or reuse a kept-alive one.
pub fn init(vnode: &VNode) {
    if let Some(child) = vnode.component_instance() {
        if !child.is_destroyed() && vnode.is_keep_alive() {
            prepatch(vnode, vnode);
            return;
        }
    }

    let Some(child) = Instance::for_vnode(vnode, active_instance()) else {
        return;
    };
    vnode.set_component_instance(Some(child.clone()));
    child.mount();
}

/// Move the instance to the new placeholder and push the new data into it.
pub fn prepatch(old: &VNode, vnode: &VNode) {
    let (Some(options), Some(child)) = (vnode.component_options(), old.component_instance()) else {
        return;
    };
    vnode.set_component_instance(Some(child.clone()));
    update_child_component(
        &child,
        &options.props_data,
        &options.listeners,
        vnode,
        &options.children,
    );
}

/// Fire `mounted` on first insertion and handle keep-alive activation.
pub fn insert(vnode: &VNode) {
    let Some(vm) = vnode.component_instance() else {
        return;
    };
    if !vm.is_mounted() {
        vm.set_mounted();
        vm.call_hook(Hook::Mounted);
    }
    if vnode.is_keep_alive() {
        // While the owning tree is patching, children are activated after
        // the flush so that `activated` sees a fully updated tree.
        if vnode.context().is_some_and(|context| context.is_mounted()) {
            queue_activated_component(&vm);
        } else {
            activate_child_component(&vm, true);
        }
    }
}

/// Tear the instance down, or deactivate it if keep-alive owns it.
pub fn destroy(vnode: &VNode) {
    let Some(vm) = vnode.component_instance() else {
        return;
    };
    if vm.is_destroyed() {
        return;
    }
    if vnode.is_keep_alive() {
        deactivate_child_component(&vm, true);
    } else {
        vm.destroy();
    }
}
