//! # Executors.
//!
//! An [`Executor`] accepts a boxed closure and runs it, usually on another
//! thread. [`TokioExecutor`] uses the blocking pool of a tokio runtime so
//! callbacks may block (e.g. `Stage::join`) without stalling the reactor.

use tokio::runtime::Handle;

/// A unit of work handed to an executor or caller.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Runs work, usually on another thread.
pub trait Executor: Send + Sync + 'static {
    /// Submits `work` for execution.
    fn execute(&self, work: Work);
}

impl<F> Executor for F
where
    F: Fn(Work) + Send + Sync + 'static,
{
    fn execute(&self, work: Work) {
        self(work)
    }
}

/// Executor backed by a tokio runtime's blocking thread pool.
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Creates an executor submitting to the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates an executor for the runtime the caller is running in.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, work: Work) {
        drop(self.handle.spawn_blocking(work));
    }
}
