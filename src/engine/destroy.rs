//! Destruction traversals.
//!
//! Two depth-first variants over a node's children, both strictly
//! once-per-node:
//!
//! - [`destroy`]: full teardown. Before-unmount fires top-down into
//!   currently-mounted descendants, the committed output is released from
//!   the host tree, then every node is marked `Destroyed` (parent's flag
//!   flips before descending) and after-destroy fires children-first.
//! - [`remove_subtree`]: used when a subtree is detached as part of a
//!   reconciliation move. The host-tree removal itself is the external
//!   primitive's job; this only fires before-unmount, marks the subtree
//!   `Destroyed`, and defers after-destroy hooks until the surrounding
//!   batch's host mutation finished.

use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::hooks::HookPhase;
use crate::engine::node::ComponentNode;
use crate::types::NodeStatus;

thread_local! {
    /// After-destroy work queued by removal-only traversals, drained once
    /// the surrounding batch's host mutation finishes.
    static DEFERRED_DESTROYS: RefCell<Vec<Rc<ComponentNode>>> = RefCell::new(Vec::new());
}

// =============================================================================
// Full destroy
// =============================================================================

/// Tear a node and its subtree down and release its committed output.
///
/// Must only be invoked once per node; a repeated call is a caller bug and
/// is ignored with a warning.
pub fn destroy(node: &Rc<ComponentNode>) {
    if node.status() == NodeStatus::Destroyed {
        tracing::warn!(node = node.id(), "destroy called on an already-destroyed node");
        return;
    }
    if node.status() == NodeStatus::Mounted {
        unmount_pass(node);
        if let Some(mut tree) = node.take_output() {
            tree.remove();
        }
    }
    mark_and_finalize(node);
}

/// Before-unmount, pre-order, descending only into currently-mounted nodes.
fn unmount_pass(node: &Rc<ComponentNode>) {
    if node.status() != NodeStatus::Mounted {
        return;
    }
    node.run_commit_hooks(HookPhase::BeforeUnmount);
    for child in node.children_snapshot() {
        unmount_pass(&child);
    }
}

/// Flip the flag parent-first, recurse, then fire after-destroy - so
/// descendants always observe an already-destroyed ancestor, and a parent's
/// after-destroy runs after all of its children's.
fn mark_and_finalize(node: &Rc<ComponentNode>) {
    if node.status() == NodeStatus::Destroyed {
        // A descendant that was torn down individually beforehand.
        return;
    }
    node.set_status(NodeStatus::Destroyed);
    node.clear_pending();
    for child in node.take_children() {
        mark_and_finalize(&child);
    }
    node.run_commit_hooks(HookPhase::AfterDestroy);
}

// =============================================================================
// Removal-only traversal
// =============================================================================

/// Detach-side teardown for a subtree the external primitive is removing.
pub fn remove_subtree(node: &Rc<ComponentNode>) {
    if node.status() == NodeStatus::Destroyed {
        tracing::warn!(node = node.id(), "remove_subtree on an already-destroyed node");
        return;
    }
    unmount_pass(node);
    mark_pass(node);
}

fn mark_pass(node: &Rc<ComponentNode>) {
    if node.status() == NodeStatus::Destroyed {
        return;
    }
    node.set_status(NodeStatus::Destroyed);
    node.clear_pending();
    if !node.hooks().after_destroy.is_empty() {
        DEFERRED_DESTROYS.with(|queue| queue.borrow_mut().push(node.clone()));
    }
    for child in node.take_children() {
        mark_pass(&child);
    }
}

/// Fire after-destroy hooks queued by removal-only traversals.
///
/// Called automatically at the end of every batch commit; hosts driving
/// removals outside a batch call it themselves once their host mutation is
/// done. Draining loops so hooks that queue further removals are covered.
pub fn flush_deferred_destroys() {
    loop {
        let batch: Vec<Rc<ComponentNode>> =
            DEFERRED_DESTROYS.with(|queue| queue.borrow_mut().drain(..).collect());
        if batch.is_empty() {
            break;
        }
        for node in batch {
            node.run_commit_hooks(HookPhase::AfterDestroy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::backend::RenderedTree;
    use crate::component::{Component, ComponentType, Props, RenderContext};
    use crate::engine::runtime::Runtime;
    use crate::scheduler::LocalScheduler;
    use crate::types::{MountOptions, MountPoint, PatchOptions, TreeHandle};

    struct NullTree;

    impl RenderedTree for NullTree {
        fn mount(&mut self, _target: &MountPoint, _options: &MountOptions) {}
        fn patch(&mut self, _next: Box<dyn RenderedTree>, _options: &PatchOptions) {}
        fn remove(&mut self) {}
        fn first_node(&self) -> Option<TreeHandle> {
            None
        }
        fn move_before(&mut self, _reference: &TreeHandle, _anchor: Option<&TreeHandle>) {}
    }

    struct Inert;

    impl Component for Inert {
        fn assign_props(&mut self, _props: &Props) {}

        fn render(&mut self, _ctx: &RenderContext) -> anyhow::Result<Box<dyn RenderedTree>> {
            Ok(Box::new(NullTree))
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    /// A type whose instances record their unmount/destroy hooks into `log`.
    fn hooked_type(name: &'static str, log: &Log) -> Rc<ComponentType> {
        let log = log.clone();
        ComponentType::new(name, move |ctx, _props| {
            let unmount_log = log.clone();
            ctx.before_unmount(move || {
                unmount_log.borrow_mut().push(format!("unmount {name}"));
                Ok(())
            });
            let destroy_log = log.clone();
            ctx.after_destroy(move || {
                destroy_log.borrow_mut().push(format!("destroyed {name}"));
                Ok(())
            });
            Box::new(Inert)
        })
    }

    /// Mounted chain parent -> child -> grandchild with recording hooks.
    fn mounted_chain(log: &Log) -> (Rc<ComponentNode>, Rc<ComponentNode>, Rc<ComponentNode>) {
        let runtime = Runtime::new(Rc::new(LocalScheduler::new()));

        let parent = ComponentNode::new(
            hooked_type("p", log),
            "p".into(),
            &Props::new(),
            None,
            runtime.clone(),
        );
        let child = ComponentNode::new(
            hooked_type("c", log),
            "c".into(),
            &Props::new(),
            Some(&parent),
            runtime.clone(),
        );
        parent.insert_child(child.clone());
        let grandchild = ComponentNode::new(
            hooked_type("g", log),
            "g".into(),
            &Props::new(),
            Some(&child),
            runtime,
        );
        child.insert_child(grandchild.clone());

        for node in [&parent, &child, &grandchild] {
            node.apply_result(Box::new(NullTree), None, PatchOptions::default());
            assert_eq!(node.status(), NodeStatus::Mounted);
        }
        (parent, child, grandchild)
    }

    #[test]
    fn test_destroy_orders_hooks_and_flags() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let (parent, child, grandchild) = mounted_chain(&log);

        destroy(&parent);

        assert_eq!(
            *log.borrow(),
            vec![
                "unmount p".to_string(),
                "unmount c".to_string(),
                "unmount g".to_string(),
                "destroyed g".to_string(),
                "destroyed c".to_string(),
                "destroyed p".to_string(),
            ],
            "before-unmount runs pre-order, after-destroy children-first"
        );
        for node in [&parent, &child, &grandchild] {
            assert_eq!(node.status(), NodeStatus::Destroyed);
            assert_eq!(node.child_count(), 0);
        }
        assert!(!parent.has_output(), "committed output is released");
    }

    #[test]
    fn test_descendants_observe_destroyed_ancestor() {
        let runtime = Runtime::new(Rc::new(LocalScheduler::new()));
        let observed: Rc<RefCell<Option<NodeStatus>>> = Rc::new(RefCell::new(None));

        let parent_ty = ComponentType::new("p", |_ctx, _props| Box::new(Inert));
        let parent = ComponentNode::new(parent_ty, "p".into(), &Props::new(), None, runtime.clone());

        let parent_for_hook = parent.clone();
        let observed_in_hook = observed.clone();
        let child_ty = ComponentType::new("c", move |ctx, _props| {
            let parent = parent_for_hook.clone();
            let observed = observed_in_hook.clone();
            ctx.after_destroy(move || {
                *observed.borrow_mut() = Some(parent.status());
                Ok(())
            });
            Box::new(Inert)
        });
        let child = ComponentNode::new(child_ty, "c".into(), &Props::new(), Some(&parent), runtime);
        parent.insert_child(child);

        destroy(&parent);
        assert_eq!(
            *observed.borrow(),
            Some(NodeStatus::Destroyed),
            "parent's flag flips before descending"
        );
    }

    #[test]
    fn test_destroy_twice_is_ignored() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let (parent, _child, _grandchild) = mounted_chain(&log);

        destroy(&parent);
        let events = log.borrow().len();

        destroy(&parent);
        assert_eq!(log.borrow().len(), events, "no hook fires a second time");
    }

    #[test]
    fn test_remove_subtree_defers_after_destroy() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let (parent, child, grandchild) = mounted_chain(&log);

        remove_subtree(&parent);

        assert_eq!(
            *log.borrow(),
            vec![
                "unmount p".to_string(),
                "unmount c".to_string(),
                "unmount g".to_string(),
            ],
            "after-destroy waits for the surrounding host mutation"
        );
        for node in [&parent, &child, &grandchild] {
            assert_eq!(node.status(), NodeStatus::Destroyed);
        }
        assert!(
            parent.has_output(),
            "removal-only traversal leaves the host removal to the external primitive"
        );

        flush_deferred_destroys();
        let events = log.borrow();
        assert_eq!(events.len(), 6);
        assert!(events[3..].contains(&"destroyed p".to_string()));
        assert!(events[3..].contains(&"destroyed c".to_string()));
        assert!(events[3..].contains(&"destroyed g".to_string()));
    }
}
