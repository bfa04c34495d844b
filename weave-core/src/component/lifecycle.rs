//! Activation, deactivation and parent-driven updates of child instances.

use indexmap::IndexMap;

use super::definition::Hook;
use super::instance::Instance;
use super::vnode::{Listeners, VNode};
use crate::reactive::{untracked, Value};

fn is_in_inactive_tree(vm: &Instance) -> bool {
    let mut current = vm.parent();
    while let Some(vm) = current {
        if vm.inactive() == Some(true) {
            return true;
        }
        current = vm.parent();
    }
    false
}

/// Mark `vm` and its descendants active, firing `activated` bottom-up.
///
/// `direct` is set for the instance keep-alive re-inserted itself. A
/// descendant that was deactivated directly stays inactive until it is
/// re-inserted directly too.
pub fn activate_child_component(vm: &Instance, direct: bool) {
    if direct {
        vm.set_direct_inactive(false);
        if is_in_inactive_tree(vm) {
            return;
        }
    } else if vm.is_direct_inactive() {
        return;
    }

    if vm.inactive() != Some(false) {
        vm.set_inactive(false);
        for child in vm.children() {
            activate_child_component(&child, false);
        }
        vm.call_hook(Hook::Activated);
    }
}

/// Mark `vm` and its descendants inactive, firing `deactivated` bottom-up.
pub fn deactivate_child_component(vm: &Instance, direct: bool) {
    if direct {
        vm.set_direct_inactive(true);
        if is_in_inactive_tree(vm) {
            return;
        }
    }

    if vm.inactive() != Some(true) {
        vm.set_inactive(true);
        for child in vm.children() {
            deactivate_child_component(&child, false);
        }
        vm.call_hook(Hook::Deactivated);
    }
}

/// Push the data of a re-rendered placeholder into its existing instance.
///
/// Props are written one by one so that only changed props notify; props
/// the parent stopped passing are reset to null. Slot content cannot be
/// compared cheaply, so whenever slot children are involved the child is
/// forced to re-render.
pub fn update_child_component(
    vm: &Instance,
    props_data: &IndexMap<String, Value>,
    listeners: &Listeners,
    parent_vnode: &VNode,
    render_children: &[VNode],
) {
    let has_children = !render_children.is_empty() || !vm.slot_children().is_empty();

    vm.set_parent_vnode(parent_vnode);
    vm.replace_slot_children(render_children.to_vec());

    let props = vm.props();
    for (key, value) in props_data {
        props.set(key, value.clone());
    }
    for key in untracked(|| props.keys()) {
        if !props_data.contains_key(&key) {
            props.set(&key, Value::Null);
        }
    }

    vm.replace_listeners(listeners.clone());

    if has_children {
        vm.force_update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDef;
    use crate::host::ManualHost;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn logged(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> ComponentDef {
        let (on, off) = (Rc::clone(log), Rc::clone(log));
        ComponentDef::builder()
            .name(name)
            .hook(Hook::Activated, move |vm| on.borrow_mut().push(format!("activated {}", vm.describe())))
            .hook(Hook::Deactivated, move |vm| off.borrow_mut().push(format!("deactivated {}", vm.describe())))
            .build()
    }

    #[test]
    fn deactivation_is_recursive_and_idempotent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let parent = Instance::new(&logged("parent", &log), Vec::<(String, Value)>::new());
        let child = Instance::create_child(&logged("child", &log), &parent);

        deactivate_child_component(&parent, true);
        deactivate_child_component(&parent, true);
        assert_eq!(*log.borrow(), vec!["deactivated <child>", "deactivated <parent>"]);
        assert_eq!(child.inactive(), Some(true));

        log.borrow_mut().clear();
        activate_child_component(&parent, true);
        assert_eq!(*log.borrow(), vec!["activated <child>", "activated <parent>"]);
    }

    #[test]
    fn directly_deactivated_child_stays_inactive() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let parent = Instance::new(&logged("parent", &log), Vec::<(String, Value)>::new());
        let child = Instance::create_child(&logged("child", &log), &parent);

        deactivate_child_component(&child, true);
        deactivate_child_component(&parent, true);
        activate_child_component(&parent, true);

        assert_eq!(child.inactive(), Some(true));
        assert!(child.is_direct_inactive());

        // Activating a child inside an inactive tree is deferred.
        deactivate_child_component(&parent, true);
        log.borrow_mut().clear();
        activate_child_component(&child, true);
        assert!(log.borrow().is_empty());
        assert!(!child.is_direct_inactive());
    }

    #[test]
    fn only_changed_props_notify() {
        let host = ManualHost::install();
        let renders = Rc::new(RefCell::new(0));
        let def = {
            let renders = Rc::clone(&renders);
            ComponentDef::builder()
                .render(move |vm| {
                    *renders.borrow_mut() += 1;
                    vm.prop("a");
                    VNode::empty()
                })
                .build()
        };
        let vm = Instance::new(&def, [("a", 1), ("b", 2)]);
        vm.mount();
        let placeholder = VNode::element("placeholder", Vec::new());

        let mut props = IndexMap::new();
        props.insert("a".to_string(), Value::from(1));
        props.insert("b".to_string(), Value::from(5));
        update_child_component(&vm, &props, &Listeners::new(), &placeholder, &[]);
        host.run_microtasks();
        assert_eq!(*renders.borrow(), 1);

        props.shift_remove("a");
        update_child_component(&vm, &props, &Listeners::new(), &placeholder, &[]);
        host.run_microtasks();
        assert_eq!(*renders.borrow(), 2);
        assert_eq!(vm.props().get_untracked("a"), Some(Value::Null));
    }

    #[test]
    fn slot_children_force_a_render() {
        let host = ManualHost::install();
        let renders = Rc::new(RefCell::new(0));
        let def = {
            let renders = Rc::clone(&renders);
            ComponentDef::builder()
                .render(move |_| {
                    *renders.borrow_mut() += 1;
                    VNode::empty()
                })
                .build()
        };
        let vm = Instance::new(&def, Vec::<(String, Value)>::new());
        vm.mount();
        let placeholder = VNode::element("placeholder", Vec::new());

        update_child_component(
            &vm,
            &IndexMap::new(),
            &Listeners::new(),
            &placeholder,
            &[VNode::text("slot")],
        );
        host.run_microtasks();
        assert_eq!(*renders.borrow(), 2);
        assert_eq!(vm.slot_children().len(), 1);
    }
}
