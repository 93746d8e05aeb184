//! # Framework: the injected context.
//!
//! [`Framework`] bundles the seams every operation needs (caller, executor,
//! scheduler, clock) with the [`Config`] defaults, and exposes the library's
//! operations with those seams filled in.
//!
//! ```text
//! FrameworkBuilder ──build()──► Framework { caller, executor?, scheduler?, clock, config }
//!                                   │
//!     completable / completed / failed / cancelled / call     → Stage<T>
//!     collect / collect_with / stream_collect(_with)          → Stage<U>
//!     eventually_collect / collect_and_discard                → Stage<U>
//!     managed / reloadable_managed                            → Managed<T>
//!     retry_until_completed                                   → Stage<RetryResult<T>>
//! ```
//!
//! Cloning is cheap; every clone shares the same seams.

use std::fmt;
use std::sync::Arc;

use super::{builder::FrameworkBuilder, config::Config};
use crate::{
    caller::{Caller, DirectCaller, guard},
    collect::{self, Counts, StreamCollector},
    error::Cause,
    managed::{Managed, ReloadableManaged},
    retry::{self, RetryPolicy, RetryResult},
    runtime::{Clock, Executor, Scheduler, SystemClock},
    stage::Stage,
};

/// Shared wiring for stages, collectors, managed resources and retries.
#[derive(Clone)]
pub struct Framework {
    caller: Arc<dyn Caller>,
    executor: Option<Arc<dyn Executor>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Arc<dyn Clock>,
    cfg: Config,
}

impl Framework {
    /// Returns a builder.
    pub fn builder() -> FrameworkBuilder {
        FrameworkBuilder::new()
    }

    pub(crate) fn new_internal(
        caller: Arc<dyn Caller>,
        executor: Option<Arc<dyn Executor>>,
        scheduler: Option<Arc<dyn Scheduler>>,
        clock: Arc<dyn Clock>,
        cfg: Config,
    ) -> Self {
        Self {
            caller,
            executor,
            scheduler,
            clock,
            cfg,
        }
    }

    /// The caller every stage created here dispatches listeners through.
    pub fn caller(&self) -> &Arc<dyn Caller> {
        &self.caller
    }

    /// The executor, if one was configured.
    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref()
    }

    /// The scheduler used for retry delays, if one was configured.
    pub fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref()
    }

    /// Time source for retry bookkeeping.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Settings this framework was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// A pending stage, completed by whoever holds it.
    pub fn completable<T: Clone + Send + 'static>(&self) -> Stage<T> {
        Stage::pending(self.caller.clone())
    }

    /// A stage already completed with `value`.
    pub fn completed<T: Clone + Send + 'static>(&self, value: T) -> Stage<T> {
        Stage::completed(self.caller.clone(), value)
    }

    /// A stage already failed with `cause`.
    pub fn failed<T: Clone + Send + 'static>(&self, cause: impl Into<Cause>) -> Stage<T> {
        Stage::failed(self.caller.clone(), cause)
    }

    /// A stage already cancelled.
    pub fn cancelled<T: Clone + Send + 'static>(&self) -> Stage<T> {
        Stage::cancelled(self.caller.clone())
    }

    /// Runs `f` on the executor (inline without one) and exposes its result.
    ///
    /// `Err` and panics fail the stage. Cancelling the stage before `f` starts
    /// skips it.
    pub fn call<T, E, F>(&self, f: F) -> Stage<T>
    where
        T: Clone + Send + 'static,
        E: Into<Cause>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let target = self.completable();
        let stage = target.clone();
        let work = move || {
            if stage.is_done() {
                return;
            }
            match guard(f) {
                Ok(Ok(value)) => stage.complete(value),
                Ok(Err(err)) => stage.fail(err),
                Err(cause) => stage.fail(cause),
            };
        };

        match &self.executor {
            Some(executor) => executor.execute(Box::new(work)),
            None => work(),
        }
        target
    }

    /// See [`collect::collect`](crate::collect()).
    pub fn collect<T, I>(&self, stages: I) -> Stage<Vec<T>>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = Stage<T>>,
    {
        collect::collect(self.caller.clone(), stages)
    }

    /// See [`collect_with`](crate::collect_with).
    pub fn collect_with<T, U, I, F>(&self, stages: I, reducer: F) -> Stage<U>
    where
        T: Clone + Send + 'static,
        U: Clone + Send + 'static,
        I: IntoIterator<Item = Stage<T>>,
        F: FnOnce(Vec<T>) -> U + Send + 'static,
    {
        collect::collect_with(self.caller.clone(), stages, reducer)
    }

    /// See [`stream_collect`](crate::stream_collect).
    pub fn stream_collect<T, U, I, V, F>(&self, stages: I, on_value: V, finish: F) -> Stage<U>
    where
        T: Clone + Send + 'static,
        U: Clone + Send + 'static,
        I: IntoIterator<Item = Stage<T>>,
        V: Fn(T) + Send + Sync + 'static,
        F: FnOnce(Counts) -> U + Send + 'static,
    {
        collect::stream_collect(self.caller.clone(), stages, on_value, finish)
    }

    /// See [`stream_collect_with`](crate::stream_collect_with).
    pub fn stream_collect_with<T, U, I, C>(&self, stages: I, collector: C) -> Stage<U>
    where
        T: Clone + Send + 'static,
        U: Clone + Send + 'static,
        I: IntoIterator<Item = Stage<T>>,
        C: StreamCollector<T, U>,
    {
        collect::stream_collect_with(self.caller.clone(), stages, collector)
    }

    /// See [`eventually_collect`](crate::eventually_collect).
    ///
    /// `None` uses [`Config::default_parallelism`]. The driver runs on the
    /// executor when there is one.
    pub fn eventually_collect<T, U, I, F, V, E>(
        &self,
        factories: I,
        on_value: V,
        finish: E,
        parallelism: Option<usize>,
    ) -> Stage<U>
    where
        T: Clone + Send + 'static,
        U: Clone + Send + 'static,
        I: IntoIterator<Item = F>,
        I::IntoIter: Send + 'static,
        F: FnOnce() -> Stage<T> + Send + 'static,
        V: Fn(T) + Send + Sync + 'static,
        E: FnOnce(Counts) -> U + Send + 'static,
    {
        collect::eventually_collect(
            self.caller.clone(),
            self.executor.clone(),
            factories,
            on_value,
            finish,
            parallelism.unwrap_or_else(|| self.cfg.parallelism_clamped()),
        )
    }

    /// See [`eventually_collect_with`](crate::eventually_collect_with).
    pub fn eventually_collect_with<T, U, I, F, C>(
        &self,
        factories: I,
        collector: C,
        parallelism: Option<usize>,
    ) -> Stage<U>
    where
        T: Clone + Send + 'static,
        U: Clone + Send + 'static,
        I: IntoIterator<Item = F>,
        I::IntoIter: Send + 'static,
        F: FnOnce() -> Stage<T> + Send + 'static,
        C: StreamCollector<T, U>,
    {
        collect::eventually_collect_with(
            self.caller.clone(),
            self.executor.clone(),
            factories,
            collector,
            parallelism.unwrap_or_else(|| self.cfg.parallelism_clamped()),
        )
    }

    /// See [`collect_and_discard`](crate::collect_and_discard).
    pub fn collect_and_discard<T, I>(&self, stages: I) -> Stage<()>
    where
        T: Clone + Send + 'static,
        I: IntoIterator<Item = Stage<T>>,
    {
        collect::collect_and_discard(self.caller.clone(), stages)
    }

    /// A managed resource using [`Config::capture_stack`].
    pub fn managed<T, S, D>(&self, setup: S, teardown: D) -> Managed<T>
    where
        T: Clone + Send + Sync + 'static,
        S: Fn() -> Stage<T> + Send + Sync + 'static,
        D: Fn(T) -> Stage<()> + Send + Sync + 'static,
    {
        Managed::new(self.caller.clone(), setup, teardown)
            .with_capture_stack(self.cfg.capture_stack)
    }

    /// A reloadable managed resource using [`Config::capture_stack`].
    pub fn reloadable_managed<T, S, D>(&self, setup: S, teardown: D) -> ReloadableManaged<T>
    where
        T: Clone + Send + Sync + 'static,
        S: Fn() -> Stage<T> + Send + Sync + 'static,
        D: Fn(T) -> Stage<()> + Send + Sync + 'static,
    {
        ReloadableManaged::new(self.caller.clone(), setup, teardown)
            .with_capture_stack(self.cfg.capture_stack)
    }

    /// See [`retry_until_completed`](crate::retry_until_completed); uses the
    /// framework's clock and scheduler.
    pub fn retry_until_completed<T, F>(
        &self,
        policy: &RetryPolicy,
        action: F,
    ) -> Stage<RetryResult<T>>
    where
        T: Clone + Send + 'static,
        F: Fn() -> Stage<T> + Send + Sync + 'static,
    {
        retry::retry_until_completed(
            self.caller.clone(),
            self.clock.clone(),
            self.scheduler.clone(),
            policy,
            action,
        )
    }
}

impl Default for Framework {
    /// Inline caller logging through [`LogWriter`](crate::LogWriter), system
    /// clock, no executor or scheduler.
    fn default() -> Self {
        Self::new_internal(
            Arc::new(DirectCaller::default()),
            None,
            None,
            Arc::new(SystemClock),
            Config::default(),
        )
    }
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("threaded", &self.caller.is_threaded())
            .field("executor", &self.executor.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .field("config", &self.cfg)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JoinError;
    use crate::runtime::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn quiet() -> Framework {
        Framework::builder().with_subscribers(Vec::new()).build().unwrap()
    }

    #[test]
    fn test_factories() {
        let fw = quiet();
        let pending = fw.completable::<u32>();
        assert!(!pending.is_done());
        assert!(pending.complete(1));

        assert_eq!(fw.completed(7).join_now().unwrap(), 7);
        assert!(fw.failed::<u32>("boom").is_failed());
        assert!(fw.cancelled::<u32>().is_cancelled());
    }

    #[test]
    fn test_call_inline() {
        let fw = quiet();
        let ok = fw.call(|| Ok::<_, Cause>(21 * 2));
        assert_eq!(ok.join_now().unwrap(), 42);

        let err = fw.call(|| Err::<u32, _>("bad input"));
        assert_eq!(err.cause().unwrap().to_string(), "bad input");

        let panicked = fw.call(explode);
        assert!(panicked.cause().unwrap().is_panic());
    }

    fn explode() -> Result<u32, Cause> {
        panic!("call panicked")
    }

    #[test]
    fn test_call_runs_on_executor() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let fw = Framework::builder()
            .with_tokio(rt.handle().clone())
            .with_subscribers(Vec::new())
            .build()
            .unwrap();
        let here = std::thread::current().id();

        let stage = fw.call(move || Ok::<_, Cause>(std::thread::current().id() != here));
        assert!(stage.join_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn test_call_skipped_when_cancelled_first() {
        let (tx, rx) = mpsc::channel::<crate::runtime::Work>();
        let executor: Arc<dyn Executor> = Arc::new(move |work| tx.send(work).unwrap());
        let fw = Framework::builder()
            .with_executor(executor)
            .with_subscribers(Vec::new())
            .build()
            .unwrap();

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let stage = fw.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Cause>(())
        });
        stage.cancel();
        rx.recv().unwrap()();

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(matches!(stage.join_now(), Err(JoinError::Cancelled)));
    }

    #[test]
    fn test_collectors_use_framework_caller() {
        let fw = quiet();
        let all = fw.collect(vec![fw.completed(1), fw.completed(2)]);
        assert_eq!(all.join_now().unwrap(), vec![1, 2]);

        let sum = fw.collect_with(vec![fw.completed(1), fw.completed(2)], |v| {
            v.into_iter().sum::<i32>()
        });
        assert_eq!(sum.join_now().unwrap(), 3);

        let counted = fw.stream_collect(
            vec![fw.completed(1), fw.failed("x")],
            |_: i32| {},
            |counts| counts.total(),
        );
        assert!(counted.is_failed());

        assert!(fw.collect_and_discard(Vec::<Stage<u8>>::new()).is_completed());
    }

    #[test]
    fn test_eventually_collect_uses_default_parallelism() {
        let fw = Framework::builder()
            .with_config(Config {
                default_parallelism: 2,
                ..Config::default()
            })
            .with_subscribers(Vec::new())
            .build()
            .unwrap();

        let in_flight = Arc::new(AtomicUsize::new(0));
        let pending: Arc<std::sync::Mutex<Vec<Stage<usize>>>> = Arc::default();
        let factories = {
            let (fw, in_flight, pending) = (fw.clone(), in_flight.clone(), pending.clone());
            (0..2).map(move |_| {
                let fw = fw.clone();
                let (in_flight, pending) = (in_flight.clone(), pending.clone());
                move || {
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    let stage = fw.completable::<usize>();
                    pending.lock().unwrap().push(stage.clone());
                    stage
                }
            })
        };

        let out = fw.eventually_collect(factories, |_: usize| {}, |c: Counts| c.completed, None);
        assert_eq!(in_flight.load(Ordering::SeqCst), 2);

        for (i, stage) in pending.lock().unwrap().iter().enumerate() {
            stage.complete(i);
        }
        assert_eq!(out.join_now().unwrap(), 2);
    }

    #[test]
    fn test_managed_respects_config() {
        let fw = quiet();
        let managed = fw.managed(
            {
                let fw = fw.clone();
                move || fw.completed(String::from("conn"))
            },
            {
                let fw = fw.clone();
                move |_| fw.completed(())
            },
        );
        assert!(!managed.borrow().is_valid());
        managed.start().join_now().unwrap();

        let lease = managed.borrow();
        assert_eq!(lease.get().map(String::as_str), Some("conn"));
        lease.release();
        managed.stop().join_now().unwrap();

        let reloadable = fw.reloadable_managed(
            {
                let fw = fw.clone();
                move || fw.completed(1u32)
            },
            {
                let fw = fw.clone();
                move |_| fw.completed(())
            },
        );
        reloadable.start().join_now().unwrap();
        reloadable.reload(true).join_now().unwrap();
        reloadable.stop().join_now().unwrap();
    }

    #[test]
    fn test_retry_uses_framework_clock() {
        let clock = ManualClock::new();
        let fw = Framework::builder()
            .with_clock(Arc::new(clock.clone()))
            .with_subscribers(Vec::new())
            .build()
            .unwrap();

        let (ticking, inner) = (clock.clone(), fw.clone());
        let out = fw.retry_until_completed(
            &RetryPolicy::timed(Duration::from_millis(50), RetryPolicy::linear(Duration::ZERO)),
            move || {
                ticking.advance(Duration::from_millis(20));
                inner.failed::<u32>("down")
            },
        );

        let cause = out.cause().unwrap();
        assert_eq!(cause.suppressed().len(), 2);
    }
}
