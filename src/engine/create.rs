//! Creation / reconciliation entry point.
//!
//! Invoked once per tree position per parent render: either reuses the
//! existing child node at that identifier (issuing an update attributed to
//! the parent's batch) or instantiates a fresh one (issuing its first
//! render). Exactly one node occupies each identifier per parent; a replaced
//! occupant's render unit is abandoned, never resurrected.

use std::rc::Rc;

use crate::component::{ComponentSpec, ComponentType, Props};
use crate::engine::fiber::{Fiber, finalize_batch};
use crate::engine::node::ComponentNode;
use crate::error::{RuntimeError, RuntimeResult};
use crate::types::NodeStatus;

/// Locate or create the child node for a tree position.
///
/// Reuse rules:
/// - An occupant still in its very first render (`New`) or already
///   `Destroyed` is discarded and treated as absent.
/// - A dynamically resolved specifier whose type differs from the occupant's
///   forces full recreation.
/// - Otherwise the occupant is reused and an update is issued against it,
///   keyed to the parent's current render unit.
///
/// A named specifier that is absent from the parent's static registry fails
/// with [`RuntimeError::ComponentNotFound`] and creates nothing.
pub fn child_component(
    parent: &Rc<ComponentNode>,
    key: impl Into<String>,
    spec: ComponentSpec,
    props: Props,
) -> RuntimeResult<Rc<ComponentNode>> {
    let key = key.into();

    if let Some(existing) = usable_child(parent, &key, &spec) {
        schedule_update(&existing, parent.pending_root().as_ref(), props);
        return Ok(existing);
    }

    let ty = match spec {
        ComponentSpec::Dynamic(ty) => ty,
        ComponentSpec::Named(name) => parent
            .component_type()
            .resolve(&name)
            .ok_or(RuntimeError::ComponentNotFound(name))?,
    };

    let mut props = props;
    parent
        .runtime()
        .defaults()
        .apply_defaults(&mut props, ty.name());

    let node = ComponentNode::new(ty, key, &props, Some(parent), parent.runtime().clone());
    parent.insert_child(node.clone());
    schedule_initial(&node, parent.pending_root().as_ref());
    Ok(node)
}

/// The occupant of `key`, if it can be reused for `spec`. Unusable occupants
/// are dropped from the children map; their pending units self-discard at
/// their next staleness check.
fn usable_child(
    parent: &Rc<ComponentNode>,
    key: &str,
    spec: &ComponentSpec,
) -> Option<Rc<ComponentNode>> {
    let existing = parent.child(key)?;
    if existing.status() != NodeStatus::Mounted {
        tracing::debug!(
            node = existing.id(),
            key,
            status = ?existing.status(),
            "child occupant not reusable; discarding"
        );
        parent.remove_child(key);
        // Abandon the occupant's unit; it self-discards at its next
        // staleness check and its result is dropped.
        existing.clear_pending();
        return None;
    }
    if let ComponentSpec::Dynamic(ty) = spec {
        if !ComponentType::same_type(existing.component_type(), ty) {
            tracing::debug!(
                key,
                from = existing.type_name(),
                to = ty.name(),
                "component type changed; recreating"
            );
            parent.remove_child(key);
            existing.clear_pending();
            return None;
        }
    }
    Some(existing)
}

/// Allocate and register the first render unit of a fresh node. With a
/// `batch`, the unit is a child of that batch's root; without one it becomes
/// its own root so the counter/completion protocol still holds.
pub(crate) fn schedule_initial(node: &Rc<ComponentNode>, batch: Option<&Rc<Fiber>>) {
    let fiber = match batch {
        Some(root) => Fiber::child(root, node),
        None => Fiber::root(node),
    };
    if !node.hooks().after_mount.is_empty() {
        fiber.defer_mount_hooks();
    }
    node.set_pending(fiber.clone());

    let task_node = node.clone();
    let task_fiber = fiber.clone();
    let standalone = fiber.is_root();
    let work = async move {
        task_node.initial_render_work(task_fiber.clone()).await;
        if standalone {
            finalize_batch(task_fiber).await;
        }
    };
    node.runtime().scheduler().add_fiber(fiber, Box::pin(work));
}

/// Allocate and register an update unit against an existing node.
pub(crate) fn schedule_update(node: &Rc<ComponentNode>, batch: Option<&Rc<Fiber>>, props: Props) {
    if node.status() == NodeStatus::Destroyed {
        tracing::warn!(node = node.id(), "update issued against a destroyed node; ignoring");
        return;
    }
    let fiber = match batch {
        Some(root) => Fiber::child(root, node),
        None => Fiber::root(node),
    };
    if node.hooks().has_patch_hooks() {
        fiber.defer_patch_hooks();
    }
    node.set_pending(fiber.clone());

    let task_node = node.clone();
    let task_fiber = fiber.clone();
    let standalone = fiber.is_root();
    let work = async move {
        task_node.update_work(task_fiber.clone(), props).await;
        if standalone {
            finalize_batch(task_fiber).await;
        }
    };
    node.runtime().scheduler().add_fiber(fiber, Box::pin(work));
}
