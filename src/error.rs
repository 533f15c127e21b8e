//! Runtime errors.
//!
//! All three error kinds are detected locally and funneled to the external
//! [`ErrorSink`](crate::backend::ErrorSink) rather than thrown across the
//! public entry points. Callers observe failure indirectly: a batch's
//! completion signal resolves to [`BatchError`], or never resolves at all if
//! containment swallowed it deeper in the tree.

use thiserror::Error;

use crate::engine::hooks::HookPhase;

/// Runtime result.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the lifecycle engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A named component specifier was absent from the rendering parent's
    /// static registry.
    #[error("component not found: {0:?}")]
    ComponentNotFound(String),

    /// A lifecycle hook failed. When several hooks of one phase run
    /// concurrently, the first failure in registration order is the one
    /// reported.
    #[error("{phase} hook failed: {source}")]
    HookFailure {
        phase: HookPhase,
        #[source]
        source: anyhow::Error,
    },

    /// The component's render function failed.
    #[error("render failed: {0}")]
    RenderFailure(#[source] anyhow::Error),
}

/// Resolution of a failed render batch: the root unit was marked failed and
/// its commit suppressed. The underlying error went to the error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("render batch failed; commit was suppressed")]
pub struct BatchError;
