//! # Framework builder.
//!
//! [`FrameworkBuilder`] collects the runtime seams and subscribers, then picks
//! the [`Caller`] from the configured recursion limit and executor.

use std::sync::Arc;

use tokio::runtime::Handle;

use super::{config::Config, framework::Framework};
use crate::{
    caller::{Caller, DirectCaller, RecursionSafeCaller, ThreadedCaller},
    error::BuildError,
    runtime::{Clock, Executor, Scheduler, SystemClock, TokioExecutor, TokioScheduler},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Framework`].
///
/// Everything is optional: a bare builder yields an inline [`DirectCaller`]
/// reporting to a [`LogWriter`](crate::LogWriter), the system clock, and no
/// executor or scheduler.
#[derive(Default)]
pub struct FrameworkBuilder {
    cfg: Config,
    executor: Option<Arc<dyn Executor>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Option<Arc<dyn Clock>>,
    caller: Option<Arc<dyn Caller>>,
    subscribers: Option<Vec<Arc<dyn Subscribe>>>,
}

impl FrameworkBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the executor used by threaded callers, `call` and `eventually_collect`.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Sets the scheduler used for retry backoff.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets the clock used for retry deadlines.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses `caller` as is; `threaded` and `recursion_limit` are then ignored.
    pub fn with_caller(mut self, caller: Arc<dyn Caller>) -> Self {
        self.caller = Some(caller);
        self
    }

    /// Sets diagnostic subscribers for the callers the builder creates.
    ///
    /// Without this call a single [`LogWriter`](crate::LogWriter) is installed;
    /// an empty list silences diagnostics.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = Some(subscribers);
        self
    }

    /// Uses the runtime behind `handle` as executor (blocking pool) and
    /// scheduler (timer). The runtime needs its time driver enabled.
    pub fn with_tokio(mut self, handle: Handle) -> Self {
        self.executor = Some(Arc::new(TokioExecutor::new(handle.clone())));
        self.scheduler = Some(Arc::new(TokioScheduler::new(handle)));
        self
    }

    /// See [`Config::threaded`].
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.cfg.threaded = threaded;
        self
    }

    /// See [`Config::recursion_limit`].
    pub fn recursion_limit(mut self, limit: usize) -> Self {
        self.cfg.recursion_limit = limit;
        self
    }

    /// See [`Config::capture_stack`].
    pub fn capture_stack(mut self, capture: bool) -> Self {
        self.cfg.capture_stack = capture;
        self
    }

    /// Validates the configuration and wires the framework.
    ///
    /// Fails with [`BuildError::MissingExecutor`] when the selected caller mode
    /// needs an executor and none was given.
    pub fn build(self) -> Result<Framework, BuildError> {
        let caller = match self.caller {
            Some(caller) => caller,
            None => self.make_caller()?,
        };
        tracing::debug!(
            mode = self.cfg.mode(),
            threaded = caller.is_threaded(),
            executor = self.executor.is_some(),
            scheduler = self.scheduler.is_some(),
            "framework built"
        );

        Ok(Framework::new_internal(
            caller,
            self.executor,
            self.scheduler,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.cfg,
        ))
    }

    fn make_caller(&self) -> Result<Arc<dyn Caller>, BuildError> {
        let subscribers = match &self.subscribers {
            Some(subs) => SubscriberSet::new(subs.clone()),
            None => SubscriberSet::default(),
        };

        if !self.cfg.threaded && self.cfg.recursion_guard().is_none() {
            return Ok(Arc::new(DirectCaller::new(subscribers)));
        }

        let Some(executor) = self.executor.clone() else {
            return Err(BuildError::MissingExecutor {
                mode: self.cfg.mode(),
            });
        };

        if self.cfg.threaded {
            return Ok(Arc::new(ThreadedCaller::new(executor, subscribers)));
        }

        let inner = Arc::new(DirectCaller::new(subscribers));
        Ok(Arc::new(RecursionSafeCaller::new(
            inner,
            executor,
            self.cfg.recursion_limit,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_is_direct() {
        let fw = FrameworkBuilder::new().build().unwrap();
        assert!(!fw.caller().is_threaded());
        assert!(fw.executor().is_none());
        assert!(fw.scheduler().is_none());
    }

    #[test]
    fn test_threaded_without_executor_rejected() {
        let err = FrameworkBuilder::new().threaded(true).build().unwrap_err();
        assert!(matches!(err, BuildError::MissingExecutor { mode: "threaded" }));
        assert_eq!(err.as_label(), "build_missing_executor");
    }

    #[test]
    fn test_recursion_limit_without_executor_rejected() {
        let err = FrameworkBuilder::new()
            .recursion_limit(64)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingExecutor {
                mode: "recursion_safe"
            }
        ));
    }

    #[test]
    fn test_explicit_caller_skips_validation() {
        let caller: Arc<dyn Caller> = Arc::new(DirectCaller::default());
        let fw = FrameworkBuilder::new()
            .threaded(true)
            .with_caller(caller.clone())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(fw.caller(), &caller));
    }

    #[test]
    fn test_with_tokio_wires_threaded_caller() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fw = FrameworkBuilder::new()
            .with_tokio(rt.handle().clone())
            .threaded(true)
            .with_subscribers(Vec::new())
            .build()
            .unwrap();
        assert!(fw.caller().is_threaded());
        assert!(fw.executor().is_some());
        assert!(fw.scheduler().is_some());
        assert!(fw.config().threaded);
    }
}
