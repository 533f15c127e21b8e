//! Render units (fibers) - one per attempted (re)render, ephemeral.
//!
//! A *root* unit tops a render batch: it owns the outstanding-subtree
//! counter, the deferred patch/mount hook lists, and the batch's completion
//! signal. A *child* unit belongs to a root and counts against it. The
//! *mount* variant is a root that additionally carries a mount target and
//! options for first-time attachment.
//!
//! Supersession is the only cancellation mechanism: a node's pending-unit
//! slot is reassigned and the old unit stops being acted upon at its next
//! staleness check. Every unit settles against its root exactly once -
//! computed, discarded, or failed - and the counter reaching zero is what
//! releases the batch for commit.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use bitflags::bitflags;
use futures::channel::oneshot;

use crate::backend::RenderedTree;
use crate::engine::hooks::HookPhase;
use crate::engine::node::ComponentNode;
use crate::error::BatchError;
use crate::types::{MountOptions, MountPoint, PatchOptions};

// =============================================================================
// Fiber state flags
// =============================================================================

bitflags! {
    /// Packed state bits of one render unit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FiberFlags: u8 {
        /// Result computed and waiting for commit.
        const OUTPUT_READY = 1 << 0;
        /// The commit step ran; the result was applied.
        const APPLIED = 1 << 1;
        /// Failure was handed off; this unit never commits.
        const FAILED = 1 << 2;
        /// Counted against the owning root (exactly once).
        const SETTLED = 1 << 3;
    }
}

thread_local! {
    static FIBER_ID: Cell<u64> = const { Cell::new(0) };
}

fn next_fiber_id() -> u64 {
    FIBER_ID.with(|counter| {
        let id = counter.get();
        counter.set(id + 1);
        id
    })
}

// =============================================================================
// Fiber
// =============================================================================

/// A unit of pending (re)computation of one node's output.
pub struct Fiber {
    id: u64,
    node: Weak<ComponentNode>,
    kind: FiberKind,
    result: RefCell<Option<Box<dyn RenderedTree>>>,
    flags: Cell<FiberFlags>,
}

enum FiberKind {
    Root(RootState),
    Child { root: Rc<Fiber> },
}

struct RootState {
    /// Subtree units still unsettled, this root included.
    outstanding: Cell<usize>,
    /// Every unit of the batch, registration order; drives commit order.
    /// Weak so a root never keeps itself (or superseded members) alive.
    members: RefCell<Vec<Weak<Fiber>>>,
    /// Units whose nodes registered before-patch/after-patch hooks.
    patch_fibers: RefCell<Vec<Weak<Fiber>>>,
    /// Units whose nodes registered after-mount hooks.
    mount_fibers: RefCell<Vec<Weak<Fiber>>>,
    failed: Cell<bool>,
    subtree_tx: RefCell<Option<oneshot::Sender<()>>>,
    subtree_rx: RefCell<Option<oneshot::Receiver<()>>>,
    done_tx: RefCell<Option<oneshot::Sender<Result<(), BatchError>>>>,
    done_rx: RefCell<Option<oneshot::Receiver<Result<(), BatchError>>>>,
    /// `Some` makes this the mount variant.
    target: Option<MountPoint>,
    mount_options: MountOptions,
    patch_options: PatchOptions,
}

impl Fiber {
    fn new_root(
        node: &Rc<ComponentNode>,
        target: Option<MountPoint>,
        mount_options: MountOptions,
    ) -> Rc<Fiber> {
        let (subtree_tx, subtree_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let fiber = Rc::new(Fiber {
            id: next_fiber_id(),
            node: Rc::downgrade(node),
            kind: FiberKind::Root(RootState {
                outstanding: Cell::new(1),
                members: RefCell::new(Vec::new()),
                patch_fibers: RefCell::new(Vec::new()),
                mount_fibers: RefCell::new(Vec::new()),
                failed: Cell::new(false),
                subtree_tx: RefCell::new(Some(subtree_tx)),
                subtree_rx: RefCell::new(Some(subtree_rx)),
                done_tx: RefCell::new(Some(done_tx)),
                done_rx: RefCell::new(Some(done_rx)),
                target,
                mount_options,
                patch_options: PatchOptions::default(),
            }),
            result: RefCell::new(None),
            flags: Cell::new(FiberFlags::default()),
        });
        fiber
            .state()
            .members
            .borrow_mut()
            .push(Rc::downgrade(&fiber));
        fiber
    }

    /// Root unit of a fresh batch.
    pub(crate) fn root(node: &Rc<ComponentNode>) -> Rc<Fiber> {
        Self::new_root(node, None, MountOptions::default())
    }

    /// Mount-variant root: first-time attachment at `target`.
    pub(crate) fn mount_root(
        node: &Rc<ComponentNode>,
        target: MountPoint,
        options: MountOptions,
    ) -> Rc<Fiber> {
        Self::new_root(node, Some(target), options)
    }

    /// Child unit under `batch`'s root; bumps the root's counter.
    pub(crate) fn child(batch: &Rc<Fiber>, node: &Rc<ComponentNode>) -> Rc<Fiber> {
        let root = batch.owning_root();
        let fiber = Rc::new(Fiber {
            id: next_fiber_id(),
            node: Rc::downgrade(node),
            kind: FiberKind::Child { root: root.clone() },
            result: RefCell::new(None),
            flags: Cell::new(FiberFlags::default()),
        });
        let state = root.state();
        state.outstanding.set(state.outstanding.get() + 1);
        state.members.borrow_mut().push(Rc::downgrade(&fiber));
        fiber
    }

    /// Owning root's state; for a root unit, its own.
    fn state(&self) -> &RootState {
        match &self.kind {
            FiberKind::Root(state) => state,
            FiberKind::Child { root } => root.state(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, FiberKind::Root(_))
    }

    pub fn flags(&self) -> FiberFlags {
        self.flags.get()
    }

    /// The node this unit will commit into, if it is still alive.
    pub fn node(&self) -> Option<Rc<ComponentNode>> {
        self.node.upgrade()
    }

    /// The root of the batch this unit belongs to (itself for roots).
    pub fn owning_root(self: &Rc<Self>) -> Rc<Fiber> {
        match &self.kind {
            FiberKind::Root(_) => self.clone(),
            FiberKind::Child { root } => root.clone(),
        }
    }

    /// Whether the owning root was marked failed (commit suppressed).
    pub fn batch_failed(&self) -> bool {
        self.state().failed.get()
    }

    /// Mark the owning root failed.
    pub(crate) fn mark_batch_failed(&self) {
        self.state().failed.set(true);
    }

    /// The batch's completion signal. Resolves `Ok` once the batch
    /// committed, `Err(BatchError)` if the root was marked failed. Can be
    /// taken once; on a child unit this yields the owning root's signal.
    pub fn completion(&self) -> Option<BatchHandle> {
        self.state()
            .done_rx
            .borrow_mut()
            .take()
            .map(|rx| BatchHandle { rx })
    }

    /// Enqueue this unit on its root's deferred patch-hook list, so the
    /// node's before-patch/after-patch hooks fire once around the batch
    /// commit.
    pub(crate) fn defer_patch_hooks(self: &Rc<Self>) {
        self.state()
            .patch_fibers
            .borrow_mut()
            .push(Rc::downgrade(self));
    }

    /// Enqueue this unit on its root's deferred after-mount list.
    pub(crate) fn defer_mount_hooks(self: &Rc<Self>) {
        self.state()
            .mount_fibers
            .borrow_mut()
            .push(Rc::downgrade(self));
    }

    // =========================================================================
    // Settling - each unit counts against its root exactly once
    // =========================================================================

    /// Flip the settled bit; `false` when the unit already settled.
    fn begin_settle(&self) -> bool {
        let flags = self.flags.get();
        if flags.contains(FiberFlags::SETTLED) {
            tracing::warn!(fiber = self.id, "render unit settled twice; ignoring");
            return false;
        }
        self.flags.set(flags | FiberFlags::SETTLED);
        true
    }

    /// Result computed; store it and count down.
    pub(crate) fn settle_computed(self: &Rc<Self>, result: Box<dyn RenderedTree>) {
        if !self.begin_settle() {
            return;
        }
        *self.result.borrow_mut() = Some(result);
        self.flags.set(self.flags.get() | FiberFlags::OUTPUT_READY);
        self.count_down();
    }

    /// Superseded before producing a committed result; count down silently.
    pub(crate) fn settle_discarded(self: &Rc<Self>) {
        if !self.begin_settle() {
            return;
        }
        tracing::debug!(fiber = self.id, "render unit discarded");
        self.count_down();
    }

    /// Failure handed off to the error sink; optionally fail the batch.
    pub(crate) fn settle_failed(self: &Rc<Self>, fail_batch: bool) {
        if !self.begin_settle() {
            return;
        }
        self.flags.set(self.flags.get() | FiberFlags::FAILED);
        if fail_batch {
            self.mark_batch_failed();
        }
        self.count_down();
    }

    fn count_down(&self) {
        let state = self.state();
        let remaining = state.outstanding.get().saturating_sub(1);
        state.outstanding.set(remaining);
        if remaining == 0 {
            if let Some(tx) = state.subtree_tx.borrow_mut().take() {
                let _ = tx.send(());
            }
        }
    }

    /// Await the subtree counter reaching zero. Root-only; awaiting twice
    /// returns immediately.
    pub(crate) async fn wait_subtree(&self) {
        let rx = self.state().subtree_rx.borrow_mut().take();
        if let Some(rx) = rx {
            // A dropped sender can only mean the counter already hit zero.
            let _ = rx.await;
        }
    }

    pub(crate) fn resolve(&self, result: Result<(), BatchError>) {
        if let Some(tx) = self.state().done_tx.borrow_mut().take() {
            let _ = tx.send(result);
        }
    }

    // =========================================================================
    // Commit-side accessors
    // =========================================================================

    pub(crate) fn take_result(&self) -> Option<Box<dyn RenderedTree>> {
        self.result.borrow_mut().take()
    }

    pub(crate) fn set_applied(&self) {
        self.flags.set(self.flags.get() | FiberFlags::APPLIED);
    }

    /// Mount target and options, for the mount variant only. Never resolves
    /// through to the root from a child unit.
    fn mount_into(&self) -> Option<(&MountPoint, &MountOptions)> {
        match &self.kind {
            FiberKind::Root(state) => state.target.as_ref().map(|t| (t, &state.mount_options)),
            FiberKind::Child { .. } => None,
        }
    }

    fn patch_options(&self) -> PatchOptions {
        self.state().patch_options
    }

    /// Still current on its node, computed, and not failed.
    fn committable(self: &Rc<Self>) -> bool {
        let flags = self.flags.get();
        if !flags.contains(FiberFlags::OUTPUT_READY) || flags.contains(FiberFlags::FAILED) {
            return false;
        }
        match self.node() {
            Some(node) => node.is_current(self),
            None => false,
        }
    }
}

// =============================================================================
// Batch completion handle
// =============================================================================

/// Awaitable completion signal of a render batch.
pub struct BatchHandle {
    rx: oneshot::Receiver<Result<(), BatchError>>,
}

impl Future for BatchHandle {
    type Output = Result<(), BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Root dropped without resolving: the batch can never commit.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(BatchError)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// =============================================================================
// Batch finalization
// =============================================================================

/// Tail of every root unit's work: wait for the subtree counter, then either
/// commit the batch or reject its completion signal.
pub(crate) async fn finalize_batch(root: Rc<Fiber>) {
    root.wait_subtree().await;
    if root.batch_failed() {
        tracing::warn!(fiber = root.id(), "batch failed; commit suppressed");
        root.resolve(Err(BatchError));
        return;
    }
    commit_batch(&root);
    root.resolve(Ok(()));
}

/// Apply a completed batch to the nodes and the host tree. Non-suspending.
/// Units whose last strong reference went away were superseded; upgrading
/// past them is the same as skipping a stale unit.
fn commit_batch(root: &Rc<Fiber>) {
    let upgrade = |list: &RefCell<Vec<Weak<Fiber>>>| -> Vec<Rc<Fiber>> {
        list.borrow().iter().filter_map(Weak::upgrade).collect()
    };
    let patch_fibers = upgrade(&root.state().patch_fibers);
    let mount_fibers = upgrade(&root.state().mount_fibers);
    let members = upgrade(&root.state().members);

    // Before-patch fires once per node, before any host mutation.
    for fiber in &patch_fibers {
        if fiber.committable() {
            if let Some(node) = fiber.node() {
                node.run_commit_hooks(HookPhase::BeforePatch);
            }
        }
    }

    for member in &members {
        commit_fiber(member);
    }

    for fiber in &patch_fibers {
        if fiber.flags().contains(FiberFlags::APPLIED) {
            if let Some(node) = fiber.node() {
                node.run_commit_hooks(HookPhase::AfterPatch);
            }
        }
    }
    for fiber in &mount_fibers {
        if fiber.flags().contains(FiberFlags::APPLIED) {
            if let Some(node) = fiber.node() {
                node.run_commit_hooks(HookPhase::AfterMount);
            }
        }
    }

    // Removal-only traversals queued after-destroy work for "once the host
    // mutation finishes" - which is now.
    crate::engine::destroy::flush_deferred_destroys();
}

/// Commit one unit: swap its result into the node and the host tree.
fn commit_fiber(member: &Rc<Fiber>) {
    let Some(node) = member.node() else {
        return;
    };
    if !member.committable() {
        tracing::trace!(fiber = member.id(), "unit not committable; skipped");
        return;
    }
    let Some(result) = member.take_result() else {
        return;
    };
    node.apply_result(result, member.mount_into(), member.patch_options());
    member.set_applied();
    node.clear_pending_if(member);
}
