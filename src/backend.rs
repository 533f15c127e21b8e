//! External collaborator contracts.
//!
//! The lifecycle engine sequences *when* these are called; it never looks
//! inside them. The rendered-tree primitive owns diffing and host mutation,
//! the error sink owns containment policy, and the defaulting collaborator
//! owns type-declared property defaults.

use std::any::Any;
use std::rc::Rc;

use crate::component::Props;
use crate::engine::node::ComponentNode;
use crate::error::RuntimeError;
use crate::types::{MountOptions, MountPoint, PatchOptions, TreeHandle};

// =============================================================================
// Rendered-tree primitive
// =============================================================================

/// Handle to an externally diffed subtree.
///
/// The engine calls `mount` exactly once (first commit of a mount-variant
/// root), `patch` on every committed update, and `remove` during destroy.
/// `first_node`/`move_before` are exposed so outer reconciliation layers can
/// reposition keyed subtrees; the engine itself never reorders.
pub trait RenderedTree: Any {
    /// Attach the subtree at `target` in the host tree.
    fn mount(&mut self, target: &MountPoint, options: &MountOptions);

    /// Diff `next` against this subtree and apply the difference to the
    /// host tree.
    fn patch(&mut self, next: Box<dyn RenderedTree>, options: &PatchOptions);

    /// Detach the subtree from the host tree.
    fn remove(&mut self);

    /// First host node of the subtree, if it produced any.
    fn first_node(&self) -> Option<TreeHandle>;

    /// Move the subtree in front of `anchor` under `reference`'s parent.
    fn move_before(&mut self, reference: &TreeHandle, anchor: Option<&TreeHandle>);
}

// =============================================================================
// Error sink
// =============================================================================

/// What the error sink decided to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Mark the owning root unit failed; its commit is suppressed and the
    /// batch's completion signal rejects.
    FailBatch,
    /// Swallow; the batch proceeds without the failing unit.
    Contain,
}

/// Receives every hook and render failure.
///
/// The engine hands the failing node and the error over, then stops acting
/// on the failing unit. Whatever escalation happens beyond that (error
/// boundaries, re-raising up the tree) is the sink's business.
pub trait ErrorSink {
    fn handle_error(&self, node: &Rc<ComponentNode>, error: RuntimeError) -> ErrorDisposition;
}

/// Default sink: log the failure and fail the owning batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrors;

impl ErrorSink for LogErrors {
    fn handle_error(&self, node: &Rc<ComponentNode>, error: RuntimeError) -> ErrorDisposition {
        tracing::error!(
            component = node.type_name(),
            node = node.id(),
            %error,
            "lifecycle failure"
        );
        ErrorDisposition::FailBatch
    }
}

// =============================================================================
// Property defaulting
// =============================================================================

/// Fills type-declared defaults into an incoming property bag. Runs before
/// the before-props-update hooks see the properties.
pub trait PropDefaults {
    fn apply_defaults(&self, props: &mut Props, component: &str);
}

/// Default collaborator: leaves properties untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDefaults;

impl PropDefaults for NoDefaults {
    fn apply_defaults(&self, _props: &mut Props, _component: &str) {}
}
