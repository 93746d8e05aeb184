//! # Streaming collectors: constant memory, no per-child value retention.
//!
//! Values are handed to a [`StreamCollector`] as they arrive; only counters
//! and failure causes are kept. Hooks may be called concurrently from
//! different threads, so collectors are `Sync` and take `&self`.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::caller::{Caller, guard};
use crate::collect::job::{aggregate, cancel_children_on_cancel};
use crate::error::Cause;
use crate::stage::{Outcome, Stage};

/// How many children ended in each terminal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    /// Children that completed with a value.
    pub completed: usize,
    /// Children that failed.
    pub failed: usize,
    /// Children that were cancelled (or never started).
    pub cancelled: usize,
}

impl Counts {
    /// Total number of children accounted for.
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// Receives child outcomes one at a time and produces the final value.
///
/// `end` is called exactly once, after every child has been accounted for,
/// even when children failed or were cancelled. Its result is only used when
/// no child failed and none was cancelled.
pub trait StreamCollector<T, U>: Send + Sync + 'static {
    /// A child completed with `value`. A panic here counts that child as failed.
    fn completed(&self, value: T);

    /// A child failed.
    fn failed(&self, _cause: &Cause) {}

    /// A child was cancelled.
    fn cancelled(&self) {}

    /// Produces the collected value.
    fn end(&self, counts: Counts) -> Result<U, Cause>;
}

/// Adapts a value callback plus a finishing function into a collector.
struct FnCollector<T, U, V, F> {
    on_value: V,
    finish: Mutex<Option<F>>,
    _types: PhantomData<fn(T) -> U>,
}

impl<T, U, V, F> StreamCollector<T, U> for FnCollector<T, U, V, F>
where
    T: 'static,
    U: 'static,
    V: Fn(T) + Send + Sync + 'static,
    F: FnOnce(Counts) -> U + Send + 'static,
{
    fn completed(&self, value: T) {
        (self.on_value)(value);
    }

    fn end(&self, counts: Counts) -> Result<U, Cause> {
        let finish = self
            .finish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match finish {
            Some(finish) => Ok(finish(counts)),
            None => Err(Cause::msg("stream collector finished twice")),
        }
    }
}

/// Collector that drops every value.
struct Discard;

impl<T: 'static> StreamCollector<T, ()> for Discard {
    fn completed(&self, _value: T) {}

    fn end(&self, _counts: Counts) -> Result<(), Cause> {
        Ok(())
    }
}

/// Shared accounting for one streaming collection.
///
/// `remaining` starts at the number of known children; drivers that create
/// children lazily start it at 1 and [`expect`](StreamJob::expect) each child.
pub(crate) struct StreamJob<T, U, C> {
    remaining: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    causes: Mutex<Vec<Cause>>,
    collector: C,
    target: Stage<U>,
    _types: PhantomData<fn(T)>,
}

impl<T, U, C> StreamJob<T, U, C>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    C: StreamCollector<T, U>,
{
    pub(crate) fn new(target: Stage<U>, collector: C, expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            causes: Mutex::new(Vec::new()),
            collector,
            target,
            _types: PhantomData,
        }
    }

    /// Announces one more child before it is created.
    pub(crate) fn expect(&self) {
        self.remaining.fetch_add(1, Ordering::AcqRel);
    }

    /// Accounts one child outcome; the last one finishes the collection.
    pub(crate) fn record(&self, outcome: Outcome<T>) {
        match outcome {
            Outcome::Completed(v) => match guard(|| self.collector.completed(v)) {
                Ok(()) => {
                    self.completed.fetch_add(1, Ordering::AcqRel);
                }
                Err(cause) => self.push_failure(cause),
            },
            Outcome::Failed(cause) => {
                if let Err(panic) = guard(|| self.collector.failed(&cause)) {
                    self.target.caller().internal_error("stream collector", panic);
                }
                self.push_failure(cause);
            }
            Outcome::Cancelled => {
                if let Err(panic) = guard(|| self.collector.cancelled()) {
                    self.target.caller().internal_error("stream collector", panic);
                }
                self.cancelled.fetch_add(1, Ordering::AcqRel);
            }
        }
        self.arrive();
    }

    /// Drops one pending count without an outcome (used by lazy drivers).
    pub(crate) fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn push_failure(&self, cause: Cause) {
        self.failed.fetch_add(1, Ordering::AcqRel);
        self.causes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cause);
    }

    fn finish(&self) {
        let counts = Counts {
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            cancelled: self.cancelled.load(Ordering::Acquire),
        };
        let ended = guard(|| self.collector.end(counts));
        let causes = std::mem::take(&mut *self.causes.lock().unwrap_or_else(PoisonError::into_inner));

        if !causes.is_empty() {
            self.target.fail(aggregate(causes, counts.total()));
            return;
        }
        if counts.cancelled > 0 {
            self.target.cancel();
            return;
        }
        match ended {
            Ok(Ok(u)) => {
                self.target.complete(u);
            }
            Ok(Err(cause)) | Err(cause) => {
                self.target.fail(cause);
            }
        }
    }
}

/// Streams child values into `collector` and completes with its `end` result.
pub fn stream_collect_with<T, U, I, C>(caller: Arc<dyn Caller>, stages: I, collector: C) -> Stage<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    I: IntoIterator<Item = Stage<T>>,
    C: StreamCollector<T, U>,
{
    let stages: Vec<Stage<T>> = stages.into_iter().collect();
    let target = Stage::pending(caller);
    let job = Arc::new(StreamJob::new(target.clone(), collector, stages.len()));

    if stages.is_empty() {
        job.finish();
        return target;
    }

    cancel_children_on_cancel(&target, stages.iter().map(Stage::downgrade).collect());
    for stage in stages {
        let job = Arc::clone(&job);
        stage.when_done(move |outcome| job.record(outcome));
    }
    target
}

/// Streams child values into `on_value`, then completes with `finish(counts)`.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use stagecraft::{stream_collect, Caller, DirectCaller, Stage};
///
/// let caller: Arc<dyn Caller> = Arc::new(DirectCaller::default());
/// let sum = Arc::new(AtomicU64::new(0));
/// let acc = sum.clone();
/// let stages = (1..=3).map(|v| Stage::completed(caller.clone(), v));
///
/// let total = stream_collect(
///     caller.clone(),
///     stages,
///     move |v| {
///         acc.fetch_add(v, Ordering::SeqCst);
///     },
///     move |_counts| sum.load(Ordering::SeqCst),
/// );
/// assert_eq!(total.join_now().unwrap(), 6);
/// ```
pub fn stream_collect<T, U, I, V, F>(
    caller: Arc<dyn Caller>,
    stages: I,
    on_value: V,
    finish: F,
) -> Stage<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    I: IntoIterator<Item = Stage<T>>,
    V: Fn(T) + Send + Sync + 'static,
    F: FnOnce(Counts) -> U + Send + 'static,
{
    stream_collect_with(caller, stages, fn_collector(on_value, finish))
}

pub(crate) fn fn_collector<T, U, V, F>(on_value: V, finish: F) -> impl StreamCollector<T, U>
where
    T: 'static,
    U: 'static,
    V: Fn(T) + Send + Sync + 'static,
    F: FnOnce(Counts) -> U + Send + 'static,
{
    FnCollector {
        on_value,
        finish: Mutex::new(Some(finish)),
        _types: PhantomData,
    }
}

/// Waits for every stage and discards the values.
///
/// Fails or cancels like [`collect`](crate::collect) does.
pub fn collect_and_discard<T, I>(caller: Arc<dyn Caller>, stages: I) -> Stage<()>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Stage<T>>,
{
    stream_collect_with(caller, stages, Discard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::DirectCaller;
    use crate::error::{CollectError, JoinError};
    use crate::subscribers::SubscriberSet;
    use std::sync::atomic::AtomicU64;

    fn caller() -> Arc<dyn Caller> {
        Arc::new(DirectCaller::new(SubscriberSet::empty()))
    }

    #[derive(Default)]
    struct Recording {
        sum: AtomicU64,
        ended: Mutex<Vec<Counts>>,
    }

    impl StreamCollector<u64, u64> for Arc<Recording> {
        fn completed(&self, value: u64) {
            if value == 13 {
                panic!("unlucky");
            }
            self.sum.fetch_add(value, Ordering::SeqCst);
        }

        fn end(&self, counts: Counts) -> Result<u64, Cause> {
            self.ended.lock().unwrap().push(counts);
            Ok(self.sum.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_stream_collect_sums_and_counts() {
        let c = caller();
        let stages: Vec<_> = (0..10u64).map(|v| Stage::completed(c.clone(), v)).collect();
        let counts = Arc::new(Mutex::new(None));
        let seen = counts.clone();
        let out = stream_collect(c, stages, |_| {}, move |n| {
            *seen.lock().unwrap() = Some(n);
            n.completed
        });

        assert_eq!(out.join_now().unwrap(), 10);
        let counts = *counts.lock().unwrap();
        assert_eq!(
            counts,
            Some(Counts { completed: 10, failed: 0, cancelled: 0 })
        );
    }

    #[test]
    fn test_end_runs_once_even_on_failure() {
        let c = caller();
        let recording = Arc::new(Recording::default());
        let failure = Cause::msg("child");
        let stages = vec![
            Stage::completed(c.clone(), 1u64),
            Stage::failed(c.clone(), failure.clone()),
            Stage::completed(c.clone(), 13u64),
            Stage::cancelled(c.clone()),
        ];

        let out = stream_collect_with(c, stages, recording.clone());

        let cause = out.cause().unwrap();
        assert!(matches!(
            cause.downcast_ref::<CollectError>(),
            Some(CollectError::Failed { failed: 2, total: 4 })
        ));
        assert!(cause.suppressed()[0].same_error(&failure));
        assert!(cause.suppressed()[1].is_panic());
        assert_eq!(
            *recording.ended.lock().unwrap(),
            vec![Counts { completed: 1, failed: 2, cancelled: 1 }]
        );
    }

    #[test]
    fn test_collect_and_discard() {
        let c = caller();
        let pending = Stage::<u32>::pending(c.clone());
        let out = collect_and_discard(c.clone(), vec![Stage::completed(c.clone(), 1), pending.clone()]);
        assert!(!out.is_done());
        pending.complete(2);
        assert!(out.join_now().is_ok());

        let out = collect_and_discard(c.clone(), vec![Stage::<u32>::cancelled(c)]);
        assert!(matches!(out.join_now(), Err(JoinError::Cancelled)));
    }

    #[test]
    fn test_cancelling_stream_parent_cancels_children() {
        let c = caller();
        let child = Stage::<u32>::pending(c.clone());
        let out = collect_and_discard(c, vec![child.clone()]);
        assert!(out.cancel());
        assert!(child.is_cancelled());
    }
}
