//! # Recursion-bounded caller.
//!
//! Completing a stage runs its listeners, which complete derived stages, which
//! run *their* listeners... With an inline caller a chain of N transforms
//! needs N nested frames. [`RecursionSafeCaller`] counts the nesting per thread
//! and, once the limit is hit, hands the next unit of work to an executor,
//! where it starts again on a fresh stack.
//!
//! ```text
//! depth < limit  ─► DEPTH += 1 ─► inner.execute(work) ─► DEPTH -= 1
//! depth >= limit ─► executor.execute(inner.execute(work))      (trampoline)
//! ```

use std::{cell::Cell, sync::Arc};

use crate::caller::Caller;
use crate::events::Event;
use crate::runtime::{Executor, Work};

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Restores the depth counter on every exit path.
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        DEPTH.with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Wraps another caller and bounds synchronous recursion.
#[derive(Clone)]
pub struct RecursionSafeCaller {
    inner: Arc<dyn Caller>,
    executor: Arc<dyn Executor>,
    limit: usize,
}

impl RecursionSafeCaller {
    /// Wraps `inner`; past `limit` nested dispatches on one thread, work goes to `executor`.
    ///
    /// A `limit` of zero is treated as one.
    pub fn new(inner: Arc<dyn Caller>, executor: Arc<dyn Executor>, limit: usize) -> Self {
        Self {
            inner,
            executor,
            limit: limit.max(1),
        }
    }

    /// The configured depth limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Current nesting depth on this thread.
    pub fn current_depth() -> usize {
        DEPTH.with(Cell::get)
    }
}

impl Caller for RecursionSafeCaller {
    fn execute(&self, work: Work) {
        if Self::current_depth() >= self.limit {
            let inner = Arc::clone(&self.inner);
            self.executor.execute(Box::new(move || {
                let _depth = DepthGuard::enter();
                inner.execute(work);
            }));
            return;
        }

        let _depth = DepthGuard::enter();
        self.inner.execute(work);
    }

    fn is_threaded(&self) -> bool {
        self.inner.is_threaded()
    }

    fn publish(&self, event: Event) {
        self.inner.publish(event);
    }
}

impl std::fmt::Debug for RecursionSafeCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursionSafeCaller")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}
