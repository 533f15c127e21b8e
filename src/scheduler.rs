//! Fiber scheduling - the seam between the engine and task batching.
//!
//! The engine registers every render unit's work with a [`FiberScheduler`]
//! and never assumes *when* it runs; completion is observed on the unit's
//! own completion signal, not through a scheduler callback.
//!
//! [`LocalScheduler`] is the bundled single-threaded implementation: a
//! `futures` local pool the host drives explicitly with
//! [`run_until_stalled`](LocalScheduler::run_until_stalled) (once per frame,
//! per event-loop turn, per test step, ...).

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;

use crate::engine::fiber::Fiber;

// =============================================================================
// Scheduler contract
// =============================================================================

/// Decides when queued render units actually execute.
pub trait FiberScheduler {
    /// Register a render unit for eventual execution. `work` is the unit's
    /// entire lifecycle task; running it to completion settles the unit.
    fn add_fiber(&self, fiber: Rc<Fiber>, work: LocalBoxFuture<'static, ()>);
}

// =============================================================================
// Local scheduler
// =============================================================================

/// Single-threaded cooperative scheduler over a `futures` local pool.
///
/// Registration goes through a detached [`LocalSpawner`] handle so fibers
/// can register further fibers while the pool itself is being driven.
pub struct LocalScheduler {
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    in_flight: Rc<Cell<usize>>,
    _not_send: PhantomData<Rc<()>>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
            in_flight: Rc::new(Cell::new(0)),
            _not_send: PhantomData,
        }
    }

    /// Run queued fiber work until everything is parked or finished.
    pub fn run_until_stalled(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }

    /// Drive the pool until `fut` resolves.
    pub fn run_until<F: Future>(&self, fut: F) -> F::Output {
        self.pool.borrow_mut().run_until(fut)
    }

    /// Number of registered units whose work has not finished yet.
    pub fn pending_count(&self) -> usize {
        self.in_flight.get()
    }
}

impl Default for LocalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FiberScheduler for LocalScheduler {
    fn add_fiber(&self, fiber: Rc<Fiber>, work: LocalBoxFuture<'static, ()>) {
        tracing::trace!(fiber = fiber.id(), "fiber queued");
        let in_flight = self.in_flight.clone();
        in_flight.set(in_flight.get() + 1);

        self.spawner
            .spawn_local(async move {
                work.await;
                in_flight.set(in_flight.get() - 1);
            })
            .expect("fiber spawn failed");
    }
}

// =============================================================================
// Scheduling tick
// =============================================================================

/// Suspend for exactly one scheduler tick.
///
/// Used by self-initiated re-renders so a destruction or supersession that
/// lands in the same tick wins over the re-render.
pub(crate) fn yield_tick() -> YieldTick {
    YieldTick { yielded: false }
}

pub(crate) struct YieldTick {
    yielded: bool,
}

impl Future for YieldTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_yield_tick_resumes_after_one_tick() {
        let mut pool = LocalPool::new();
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();

        pool.spawner()
            .spawn_local(async move {
                yield_tick().await;
                ran_clone.set(true);
            })
            .expect("spawn failed");

        pool.run_until_stalled();
        assert!(ran.get(), "yield_tick should resume within one drive");
    }

    #[test]
    fn test_run_until_drives_spawned_work() {
        let scheduler = LocalScheduler::new();
        let value = scheduler.run_until(async { 11 });
        assert_eq!(value, 11);
    }
}
