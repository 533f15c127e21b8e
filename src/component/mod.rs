//! Component authoring seam - the minimum surface the engine needs from
//! user components.
//!
//! A component is an opaque stateful object the engine owns exclusively via
//! its node. The engine only ever asks it to accept properties and to render;
//! everything else (templating, typed props, ...) lives in outer layers.
//!
//! # Pattern: explicit setup context
//!
//! Hook registration happens through a [`SetupContext`] passed into the
//! component factory, never through an ambient "currently constructing node"
//! global. The factory registers whatever hooks it wants, returns the
//! instance, and the context is consumed into the node's fixed hook lists.

mod registry;

pub use registry::{ComponentSpec, ComponentType};

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::RenderedTree;
use crate::engine::hooks::{HookFuture, LifecycleHooks};
use crate::engine::node::ComponentNode;
use crate::error::RuntimeResult;

// =============================================================================
// Props
// =============================================================================

/// Dynamic property bag handed to components.
///
/// A JSON object map so the external defaulting collaborator can fill in
/// type-declared defaults before the before-props-update phase runs.
pub type Props = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Component trait
// =============================================================================

/// A user-defined component instance, exclusively owned by its node.
pub trait Component: Any {
    /// Assign a fresh set of properties. Called after the
    /// before-props-update phase settled and the update survived its
    /// staleness check.
    fn assign_props(&mut self, props: &Props);

    /// Compute the candidate output subtree.
    ///
    /// Runs without suspension; child components are created through
    /// [`RenderContext::child`] so their units join the caller's batch.
    fn render(&mut self, ctx: &RenderContext) -> anyhow::Result<Box<dyn RenderedTree>>;
}

// =============================================================================
// Setup context
// =============================================================================

/// Construction-time context given to component factories for hook
/// registration.
#[derive(Default)]
pub struct SetupContext {
    hooks: RefCell<LifecycleHooks>,
}

impl SetupContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register an asynchronous before-start hook.
    pub fn before_start(&self, hook: impl Fn() -> HookFuture + 'static) {
        self.hooks.borrow_mut().before_start.push(Rc::new(hook));
    }

    /// Register an asynchronous before-props-update hook. Receives the new
    /// properties, defaults already filled.
    pub fn before_props_update(&self, hook: impl Fn(Rc<Props>) -> HookFuture + 'static) {
        self.hooks
            .borrow_mut()
            .before_props_update
            .push(Rc::new(hook));
    }

    /// Register a before-unmount hook.
    pub fn before_unmount(&self, hook: impl Fn() -> anyhow::Result<()> + 'static) {
        self.hooks.borrow_mut().before_unmount.push(Rc::new(hook));
    }

    /// Register an after-mount hook.
    pub fn after_mount(&self, hook: impl Fn() -> anyhow::Result<()> + 'static) {
        self.hooks.borrow_mut().after_mount.push(Rc::new(hook));
    }

    /// Register a before-patch hook (fires once per committed update batch,
    /// before commit).
    pub fn before_patch(&self, hook: impl Fn() -> anyhow::Result<()> + 'static) {
        self.hooks.borrow_mut().before_patch.push(Rc::new(hook));
    }

    /// Register an after-patch hook (fires once per committed update batch,
    /// after commit).
    pub fn after_patch(&self, hook: impl Fn() -> anyhow::Result<()> + 'static) {
        self.hooks.borrow_mut().after_patch.push(Rc::new(hook));
    }

    /// Register an after-destroy hook.
    pub fn after_destroy(&self, hook: impl Fn() -> anyhow::Result<()> + 'static) {
        self.hooks.borrow_mut().after_destroy.push(Rc::new(hook));
    }

    pub(crate) fn into_hooks(self) -> LifecycleHooks {
        self.hooks.into_inner()
    }
}

// =============================================================================
// Render context
// =============================================================================

/// Context handed to [`Component::render`].
///
/// Wraps the rendering node so child creation is attributed to the node's
/// in-flight render unit.
pub struct RenderContext {
    node: Rc<ComponentNode>,
}

impl RenderContext {
    pub(crate) fn new(node: Rc<ComponentNode>) -> Self {
        Self { node }
    }

    /// The node currently rendering.
    pub fn node(&self) -> &Rc<ComponentNode> {
        &self.node
    }

    /// Locate or create the child component for a tree position.
    ///
    /// See [`child_component`](crate::engine::create::child_component) for
    /// the reuse/recreate rules.
    pub fn child(
        &self,
        key: impl Into<String>,
        spec: ComponentSpec,
        props: Props,
    ) -> RuntimeResult<Rc<ComponentNode>> {
        crate::engine::create::child_component(&self.node, key, spec, props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_context_collects_hooks_in_order() {
        let ctx = SetupContext::new();
        ctx.after_mount(|| Ok(()));
        ctx.after_mount(|| Ok(()));
        ctx.before_patch(|| Ok(()));

        let hooks = ctx.into_hooks();
        assert_eq!(hooks.after_mount.len(), 2);
        assert_eq!(hooks.before_patch.len(), 1);
        assert!(hooks.has_patch_hooks());
        assert!(hooks.before_start.is_empty());
    }
}
