//! Runtime - the collaborator bundle and the top-level mount entry point.
//!
//! A `Runtime` ties together the three external collaborators every node
//! needs (scheduler, error sink, property defaulting) and is inherited by
//! every node created under a mount.

use std::rc::Rc;

use crate::backend::{ErrorSink, LogErrors, NoDefaults, PropDefaults};
use crate::component::{ComponentType, Props};
use crate::engine::fiber::{BatchHandle, Fiber, finalize_batch};
use crate::engine::node::ComponentNode;
use crate::scheduler::FiberScheduler;
use crate::types::{MountOptions, MountPoint};

/// Collaborator bundle shared by a component tree.
pub struct Runtime {
    scheduler: Rc<dyn FiberScheduler>,
    errors: Rc<dyn ErrorSink>,
    defaults: Rc<dyn PropDefaults>,
}

impl Runtime {
    /// Runtime with the default collaborators: errors are logged and fail
    /// their batch, properties pass through untouched.
    pub fn new(scheduler: Rc<dyn FiberScheduler>) -> Rc<Self> {
        Self::with_collaborators(scheduler, Rc::new(LogErrors), Rc::new(NoDefaults))
    }

    pub fn with_collaborators(
        scheduler: Rc<dyn FiberScheduler>,
        errors: Rc<dyn ErrorSink>,
        defaults: Rc<dyn PropDefaults>,
    ) -> Rc<Self> {
        Rc::new(Self {
            scheduler,
            errors,
            defaults,
        })
    }

    pub fn scheduler(&self) -> &Rc<dyn FiberScheduler> {
        &self.scheduler
    }

    pub(crate) fn errors(&self) -> &Rc<dyn ErrorSink> {
        &self.errors
    }

    pub(crate) fn defaults(&self) -> &Rc<dyn PropDefaults> {
        &self.defaults
    }

    /// Create a root node for `ty` and schedule its first render as a
    /// mount-variant root unit attaching at `target`.
    ///
    /// Returns the node together with the batch's completion handle;
    /// awaiting it yields `Ok` once the first commit applied, or
    /// `Err(BatchError)` when the batch failed and its commit was
    /// suppressed.
    pub fn mount(
        self: &Rc<Self>,
        ty: Rc<ComponentType>,
        props: Props,
        target: MountPoint,
        options: MountOptions,
    ) -> (Rc<ComponentNode>, BatchHandle) {
        let mut props = props;
        self.defaults.apply_defaults(&mut props, ty.name());

        let key = ty.name().to_string();
        let node = ComponentNode::new(ty, key, &props, None, self.clone());

        let fiber = Fiber::mount_root(&node, target, options);
        if !node.hooks().after_mount.is_empty() {
            fiber.defer_mount_hooks();
        }
        node.set_pending(fiber.clone());
        let handle = fiber
            .completion()
            .expect("freshly created root exposes a completion signal");

        tracing::debug!(node = node.id(), fiber = fiber.id(), "mounting component tree");

        let task_node = node.clone();
        let task_fiber = fiber.clone();
        let work = async move {
            task_node.initial_render_work(task_fiber.clone()).await;
            finalize_batch(task_fiber).await;
        };
        self.scheduler.add_fiber(fiber, Box::pin(work));
        (node, handle)
    }
}
