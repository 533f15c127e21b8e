//! ComponentNode - the stateful wrapper tying one component instance to a
//! tree position.
//!
//! A node owns its instance, its children map, and its hook lists; it holds
//! a non-owning reference to its parent and at most one pending render unit.
//! All mutation happens on the single cooperative thread, so plain
//! `Cell`/`RefCell` interior mutability is enough.
//!
//! # Pattern: join, then re-check identity
//!
//! Every asynchronous phase follows the same shape: snapshot the hook list,
//! start all hooks as independent tasks, join them as one suspension point,
//! then compare the captured unit against the node's live pending slot
//! before proceeding. That identity comparison is the entire cancellation
//! mechanism.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use futures::future::join_all;

use crate::backend::{ErrorDisposition, RenderedTree};
use crate::component::{Component, ComponentType, Props, RenderContext, SetupContext};
use crate::engine::fiber::{Fiber, FiberFlags, finalize_batch};
use crate::engine::hooks::{HookPhase, LifecycleHooks, PropsHook, StartHook, first_error};
use crate::engine::runtime::Runtime;
use crate::error::RuntimeError;
use crate::scheduler::yield_tick;
use crate::types::{MountOptions, MountPoint, NodeStatus, PatchOptions, TreeHandle};

thread_local! {
    static NODE_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_node_id() -> u64 {
    NODE_ID.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        id
    })
}

// =============================================================================
// Component node
// =============================================================================

/// One live component instance placed in the tree.
pub struct ComponentNode {
    id: u64,
    ty: Rc<ComponentType>,
    key: String,
    status: Cell<NodeStatus>,
    pending: RefCell<Option<Rc<Fiber>>>,
    output: RefCell<Option<Box<dyn RenderedTree>>>,
    children: RefCell<HashMap<String, Rc<ComponentNode>>>,
    hooks: LifecycleHooks,
    instance: RefCell<Box<dyn Component>>,
    parent: Weak<ComponentNode>,
    depth: u16,
    runtime: Rc<Runtime>,
}

impl ComponentNode {
    /// Instantiate a node: run the type's factory against a fresh setup
    /// context and freeze the registered hooks.
    pub(crate) fn new(
        ty: Rc<ComponentType>,
        key: String,
        props: &Props,
        parent: Option<&Rc<ComponentNode>>,
        runtime: Rc<Runtime>,
    ) -> Rc<Self> {
        let setup = SetupContext::new();
        let instance = ty.instantiate(&setup, props);
        let hooks = setup.into_hooks();
        let (parent_ref, depth) = match parent {
            Some(parent) => (Rc::downgrade(parent), parent.depth + 1),
            None => (Weak::new(), 0),
        };
        Rc::new(Self {
            id: next_node_id(),
            ty,
            key,
            status: Cell::new(NodeStatus::New),
            pending: RefCell::new(None),
            output: RefCell::new(None),
            children: RefCell::new(HashMap::new()),
            hooks,
            instance: RefCell::new(instance),
            parent: parent_ref,
            depth,
            runtime,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifier of this node under its parent.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> NodeStatus {
        self.status.get()
    }

    pub fn depth(&self) -> u16 {
        self.depth
    }

    pub fn parent(&self) -> Option<Rc<ComponentNode>> {
        self.parent.upgrade()
    }

    pub fn component_type(&self) -> &Rc<ComponentType> {
        &self.ty
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    /// The node's hook lists (fixed after setup).
    pub fn hooks(&self) -> &LifecycleHooks {
        &self.hooks
    }

    /// The currently pending render unit, if any.
    pub fn pending_fiber(&self) -> Option<Rc<Fiber>> {
        self.pending.borrow().clone()
    }

    pub fn child(&self, key: &str) -> Option<Rc<ComponentNode>> {
        self.children.borrow().get(key).cloned()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn has_output(&self) -> bool {
        self.output.borrow().is_some()
    }

    /// First host node of the committed output, if any.
    pub fn first_node(&self) -> Option<TreeHandle> {
        self.output.borrow().as_ref().and_then(|tree| tree.first_node())
    }

    /// Reposition the committed output in the host tree.
    pub fn move_output_before(&self, reference: &TreeHandle, anchor: Option<&TreeHandle>) {
        if let Some(tree) = self.output.borrow_mut().as_mut() {
            tree.move_before(reference, anchor);
        }
    }

    // =========================================================================
    // Pending-unit slot
    // =========================================================================

    /// Whether `fiber` is still this node's pending unit. The sole staleness
    /// test, by identity.
    pub(crate) fn is_current(&self, fiber: &Rc<Fiber>) -> bool {
        self.pending
            .borrow()
            .as_ref()
            .is_some_and(|current| Rc::ptr_eq(current, fiber))
    }

    /// Assign a fresh pending unit, superseding any earlier one.
    pub(crate) fn set_pending(&self, fiber: Rc<Fiber>) {
        let previous = self.pending.borrow_mut().replace(fiber);
        if let Some(previous) = previous {
            tracing::debug!(node = self.id, superseded = previous.id(), "pending unit superseded");
        }
    }

    /// Clear the slot only if `fiber` still owns it.
    pub(crate) fn clear_pending_if(&self, fiber: &Rc<Fiber>) {
        let mut pending = self.pending.borrow_mut();
        if pending.as_ref().is_some_and(|current| Rc::ptr_eq(current, fiber)) {
            *pending = None;
        }
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.borrow_mut().take();
    }

    /// Owning root of the pending unit, if one is in flight.
    pub(crate) fn pending_root(&self) -> Option<Rc<Fiber>> {
        self.pending.borrow().as_ref().map(|fiber| fiber.owning_root())
    }

    // =========================================================================
    // Status / children / output bookkeeping
    // =========================================================================

    pub(crate) fn set_status(&self, next: NodeStatus) {
        let current = self.status.get();
        debug_assert!(
            current < next,
            "status may only move forward: {current:?} -> {next:?}"
        );
        self.status.set(next);
    }

    pub(crate) fn insert_child(&self, child: Rc<ComponentNode>) {
        self.children.borrow_mut().insert(child.key.clone(), child);
    }

    pub(crate) fn remove_child(&self, key: &str) -> Option<Rc<ComponentNode>> {
        self.children.borrow_mut().remove(key)
    }

    pub(crate) fn children_snapshot(&self) -> Vec<Rc<ComponentNode>> {
        self.children.borrow().values().cloned().collect()
    }

    pub(crate) fn take_children(&self) -> Vec<Rc<ComponentNode>> {
        self.children.borrow_mut().drain().map(|(_, child)| child).collect()
    }

    pub(crate) fn take_output(&self) -> Option<Box<dyn RenderedTree>> {
        self.output.borrow_mut().take()
    }

    // =========================================================================
    // Render protocol
    // =========================================================================

    /// Initial render: before-start fan-out, staleness re-check, compute.
    pub(crate) async fn initial_render_work(self: Rc<Self>, fiber: Rc<Fiber>) {
        let hooks: Vec<StartHook> = self.hooks.before_start.to_vec();
        if !hooks.is_empty() {
            let results = join_all(hooks.iter().map(|hook| hook())).await;
            if let Some(source) = first_error(results) {
                self.fail_unit(
                    &fiber,
                    RuntimeError::HookFailure {
                        phase: HookPhase::BeforeStart,
                        source,
                    },
                );
                return;
            }
        }
        // The node must still be in its very first render and this unit must
        // still own the pending slot; anything else means supersession while
        // suspended.
        if self.status.get() != NodeStatus::New || !self.is_current(&fiber) {
            tracing::debug!(node = self.id, fiber = fiber.id(), "first render superseded");
            fiber.settle_discarded();
            return;
        }
        self.compute(&fiber);
    }

    /// Update: defaults, before-props-update fan-out, staleness re-check,
    /// props assignment, compute.
    pub(crate) async fn update_work(self: Rc<Self>, fiber: Rc<Fiber>, mut props: Props) {
        self.runtime
            .defaults()
            .apply_defaults(&mut props, self.ty.name());
        let props = Rc::new(props);

        let hooks: Vec<PropsHook> = self.hooks.before_props_update.to_vec();
        if !hooks.is_empty() {
            let results = join_all(hooks.iter().map(|hook| hook(props.clone()))).await;
            if let Some(source) = first_error(results) {
                self.fail_unit(
                    &fiber,
                    RuntimeError::HookFailure {
                        phase: HookPhase::BeforePropsUpdate,
                        source,
                    },
                );
                return;
            }
        }
        if self.status.get() == NodeStatus::Destroyed || !self.is_current(&fiber) {
            tracing::debug!(node = self.id, fiber = fiber.id(), "update superseded");
            fiber.settle_discarded();
            return;
        }
        self.instance.borrow_mut().assign_props(&props);
        self.compute(&fiber);
    }

    /// Compute the candidate output. Non-suspending; child creation during
    /// the render joins this unit's batch.
    pub(crate) fn compute(self: &Rc<Self>, fiber: &Rc<Fiber>) {
        let ctx = RenderContext::new(self.clone());
        let rendered = self.instance.borrow_mut().render(&ctx);
        match rendered {
            Ok(tree) => fiber.settle_computed(tree),
            Err(source) => self.fail_unit(fiber, RuntimeError::RenderFailure(source)),
        }
    }

    /// Hand a failure to the error sink and settle the unit. The pending
    /// slot is cleared but any previously committed output stays untouched.
    pub(crate) fn fail_unit(self: &Rc<Self>, fiber: &Rc<Fiber>, error: RuntimeError) {
        let disposition = self.runtime.errors().handle_error(self, error);
        self.clear_pending_if(fiber);
        fiber.settle_failed(disposition == ErrorDisposition::FailBatch);
    }

    /// Run one synchronous hook phase in registration order. Failures are
    /// funneled to the error sink; siblings still run.
    pub(crate) fn run_commit_hooks(self: &Rc<Self>, phase: HookPhase) {
        for hook in self.hooks.commit_hooks(phase) {
            if let Err(source) = hook() {
                let _ = self
                    .runtime
                    .errors()
                    .handle_error(self, RuntimeError::HookFailure { phase, source });
            }
        }
    }

    /// Commit a computed result: patch the existing output, or adopt the
    /// result (mounting it for mount-variant roots) and flip to `Mounted`.
    pub(crate) fn apply_result(
        &self,
        result: Box<dyn RenderedTree>,
        mount_into: Option<(&MountPoint, &MountOptions)>,
        patch: PatchOptions,
    ) {
        {
            let mut slot = self.output.borrow_mut();
            match slot.as_mut() {
                Some(existing) => existing.patch(result, &patch),
                None => {
                    let mut tree = result;
                    if let Some((target, options)) = mount_into {
                        tree.mount(target, options);
                    }
                    *slot = Some(tree);
                }
            }
        }
        if self.status.get() == NodeStatus::New {
            self.set_status(NodeStatus::Mounted);
        }
    }

    // =========================================================================
    // Imperative entry points
    // =========================================================================

    /// Assign new properties outside the parent-driven cycle.
    ///
    /// Runs the full update protocol (defaults, before-props-update fan-out,
    /// staleness re-check, compute) as its own root batch.
    pub fn update_props(self: &Rc<Self>, props: Props) {
        crate::engine::create::schedule_update(self, None, props);
    }

    /// Request a re-render outside the parent-driven cycle.
    ///
    /// Coalesces onto an in-flight batch when the pending unit has neither
    /// produced output nor failed. Returns
    /// [`Rerender::NothingToRender`] when the node has never rendered (or is
    /// destroyed). Otherwise a fresh root unit is scheduled; it suspends one
    /// scheduler tick before computing so a destruction or supersession in
    /// the same tick wins.
    pub fn rerender(self: &Rc<Self>) -> Rerender {
        if self.status.get() == NodeStatus::Destroyed {
            tracing::debug!(node = self.id, "re-render requested on a destroyed node");
            return Rerender::NothingToRender;
        }
        if let Some(pending) = self.pending.borrow().as_ref() {
            let flags = pending.flags();
            if !flags.contains(FiberFlags::OUTPUT_READY) && !flags.contains(FiberFlags::FAILED) {
                return Rerender::Coalesced;
            }
        }
        if self.output.borrow().is_none() && self.pending.borrow().is_none() {
            return Rerender::NothingToRender;
        }

        let fiber = Fiber::root(self);
        if self.hooks.has_patch_hooks() {
            fiber.defer_patch_hooks();
        }
        self.set_pending(fiber.clone());

        let node = self.clone();
        let unit = fiber.clone();
        let work = async move {
            yield_tick().await;
            if node.status.get() == NodeStatus::Destroyed {
                tracing::debug!(node = node.id, "destroyed before re-render; abandoning");
                unit.settle_discarded();
            } else if !node.is_current(&unit) {
                unit.settle_discarded();
            } else {
                node.compute(&unit);
            }
            finalize_batch(unit).await;
        };
        self.runtime.scheduler().add_fiber(fiber, Box::pin(work));
        Rerender::Scheduled
    }
}

impl std::fmt::Debug for ComponentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentNode")
            .field("id", &self.id)
            .field("type", &self.ty.name())
            .field("key", &self.key)
            .field("status", &self.status.get())
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Re-render outcome
// =============================================================================

/// Outcome of [`ComponentNode::rerender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rerender {
    /// A fresh root unit was scheduled.
    Scheduled,
    /// An in-flight batch will already pick up the current state.
    Coalesced,
    /// Neither output nor pending unit exists; nothing to render yet.
    NothingToRender,
}
