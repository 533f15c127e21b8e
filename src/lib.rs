//! # spark-runtime
//!
//! Cooperative component lifecycle runtime for Rust UI frameworks.
//!
//! This crate is the rendering-and-reconciliation core of a component-tree
//! runtime: it decides when and in what order each component's output is
//! (re)computed, sequences asynchronous lifecycle work without tearing the
//! tree, and contains partial failures. Diffing and host mutation live
//! behind the [`RenderedTree`] collaborator; task batching lives behind
//! [`FiberScheduler`].
//!
//! ## Architecture
//!
//! ```text
//! child_component()  ->  ComponentNode  ->  Fiber (render unit)  ->  scheduler
//!        reuse/create        state              batch counter          executes
//!                                               completion signal      commit
//! ```
//!
//! Every render or update allocates a fresh render unit and reassigns the
//! node's pending-unit slot; identity against that slot is the sole
//! staleness test, re-checked at every suspension point. A root unit's
//! subtree counter reaching zero releases the batch for commit; commit
//! itself never suspends.
//!
//! The whole engine is single-threaded cooperative: "concurrent" hook
//! invocation means independent tasks joined at one suspension point, never
//! parallel execution.
//!
//! ## Modules
//!
//! - [`types`] - Node status and the opaque host-tree vocabulary
//! - [`component`] - Component trait, setup/render contexts, type registry
//! - [`engine`] - Nodes, render units, creation and destruction traversals
//! - [`scheduler`] - Scheduler contract and the bundled local scheduler
//! - [`backend`] - Rendered-tree, error-sink and defaulting contracts

pub mod backend;
pub mod component;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod types;

// Re-export commonly used items
pub use types::{MountOptions, MountPoint, NodeStatus, PatchOptions, TreeHandle};

pub use backend::{
    ErrorDisposition, ErrorSink, LogErrors, NoDefaults, PropDefaults, RenderedTree,
};

pub use component::{
    Component, ComponentSpec, ComponentType, Props, RenderContext, SetupContext,
};

pub use engine::{
    BatchHandle, ComponentNode, Fiber, FiberFlags, HookFuture, HookPhase, LifecycleHooks,
    Rerender, Runtime, child_component, destroy, flush_deferred_destroys, remove_subtree,
};

pub use error::{BatchError, RuntimeError, RuntimeResult};

pub use scheduler::{FiberScheduler, LocalScheduler};
