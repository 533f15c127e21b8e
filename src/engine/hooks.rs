//! Lifecycle hooks - the seven ordered callback lists on every node.
//!
//! Two phases are asynchronous (before-start, before-props-update): their
//! hooks are started as independent tasks and joined as a single suspension
//! point. The remaining five fire synchronously during commit or destroy,
//! which never suspend.
//!
//! Hooks are invoked in registration order within a phase.

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use smallvec::SmallVec;

use crate::component::Props;

// =============================================================================
// Hook phases
// =============================================================================

/// The seven lifecycle phases a node can register hooks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the very first render computes.
    BeforeStart,
    /// Before new properties are assigned on an update.
    BeforePropsUpdate,
    /// Before a mounted subtree is detached from the host tree.
    BeforeUnmount,
    /// After the first commit attached the node's output.
    AfterMount,
    /// Once per committed update batch, before the batch commits.
    BeforePatch,
    /// Once per committed update batch, after the batch commits.
    AfterPatch,
    /// After the node was marked destroyed.
    AfterDestroy,
}

impl HookPhase {
    /// Stable name used in log output and error messages.
    pub fn name(self) -> &'static str {
        match self {
            HookPhase::BeforeStart => "before-start",
            HookPhase::BeforePropsUpdate => "before-props-update",
            HookPhase::BeforeUnmount => "before-unmount",
            HookPhase::AfterMount => "after-mount",
            HookPhase::BeforePatch => "before-patch",
            HookPhase::AfterPatch => "after-patch",
            HookPhase::AfterDestroy => "after-destroy",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Hook callback types
// =============================================================================

/// Future returned by an asynchronous hook.
pub type HookFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

/// Asynchronous before-start hook.
pub type StartHook = Rc<dyn Fn() -> HookFuture>;

/// Asynchronous before-props-update hook; receives the incoming properties
/// after defaults have been filled in.
pub type PropsHook = Rc<dyn Fn(Rc<Props>) -> HookFuture>;

/// Synchronous hook for the commit and destroy phases.
pub type CommitHook = Rc<dyn Fn() -> anyhow::Result<()>>;

// =============================================================================
// Per-node hook lists
// =============================================================================

/// The seven hook lists of one node, populated during setup and fixed for
/// the node's lifetime.
#[derive(Default)]
pub struct LifecycleHooks {
    pub before_start: SmallVec<[StartHook; 1]>,
    pub before_props_update: SmallVec<[PropsHook; 1]>,
    pub before_unmount: SmallVec<[CommitHook; 1]>,
    pub after_mount: SmallVec<[CommitHook; 1]>,
    pub before_patch: SmallVec<[CommitHook; 1]>,
    pub after_patch: SmallVec<[CommitHook; 1]>,
    pub after_destroy: SmallVec<[CommitHook; 1]>,
}

impl LifecycleHooks {
    /// Whether an update batch containing this node must run the deferred
    /// patch-hook pass.
    pub fn has_patch_hooks(&self) -> bool {
        !self.before_patch.is_empty() || !self.after_patch.is_empty()
    }

    /// The synchronous hook list for a commit/destroy phase.
    ///
    /// The two asynchronous phases have no synchronous list; asking for one
    /// is a caller bug.
    pub(crate) fn commit_hooks(&self, phase: HookPhase) -> &[CommitHook] {
        match phase {
            HookPhase::BeforeUnmount => &self.before_unmount,
            HookPhase::AfterMount => &self.after_mount,
            HookPhase::BeforePatch => &self.before_patch,
            HookPhase::AfterPatch => &self.after_patch,
            HookPhase::AfterDestroy => &self.after_destroy,
            HookPhase::BeforeStart | HookPhase::BeforePropsUpdate => &[],
        }
    }
}

/// First failure from a joined hook phase, in registration order.
pub(crate) fn first_error(results: Vec<anyhow::Result<()>>) -> Option<anyhow::Error> {
    results.into_iter().find_map(|result| result.err())
}
