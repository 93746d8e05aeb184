//! # Bounded-parallelism collection over lazily created stages.
//!
//! A driver walks the factories and admits each one through a counting
//! semaphore of `parallelism` permits; a child returns its permit when it
//! finishes, so at most `parallelism` factory-produced stages are in flight.
//!
//! ```text
//! driver:  for factory in factories
//!            ├─ parent cancelled? → count the rest as cancelled, stop
//!            ├─ acquire permit (blocks the driver; closed on cancel)
//!            ├─ expect one more child
//!            └─ guard(factory)
//!                 ├─ Ok(child)  → track weakly; child done → return permit, record
//!                 └─ Err(panic) → return permit, record as failed
//!          arrive (drop the driver's own count)
//!
//! cancel:  parent cancelled → flag, close semaphore, cancel tracked children
//! ```
//!
//! The stream job's countdown starts at 1 for the driver itself, so the
//! collection can only finish once the driver has handed out every factory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;

use crate::caller::{Caller, guard};
use crate::collect::stream::{Counts, StreamCollector, StreamJob, fn_collector};
use crate::runtime::Executor;
use crate::stage::{Outcome, Stage, WeakStage};

struct Coordinator<T, U, C> {
    job: StreamJob<T, U, C>,
    permits: Semaphore,
    cancelled: AtomicBool,
    in_flight: Mutex<HashMap<usize, WeakStage<T>>>,
}

impl<T, U, C> Coordinator<T, U, C>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    C: StreamCollector<T, U>,
{
    fn drive<I, F>(self: Arc<Self>, factories: I)
    where
        I: Iterator<Item = F>,
        F: FnOnce() -> Stage<T>,
    {
        let mut factories = factories.enumerate();
        let mut stopped = false;
        for (index, factory) in factories.by_ref() {
            if self.cancelled.load(Ordering::Acquire) || !self.admit() {
                stopped = true;
                break;
            }

            self.job.expect();
            match guard(factory) {
                Ok(child) => self.track(index, child),
                Err(cause) => {
                    self.permits.add_permits(1);
                    self.job.record(Outcome::Failed(cause));
                }
            }
        }
        if stopped {
            self.skip(1 + factories.count());
        }
        self.job.arrive();
    }

    /// Blocks until a permit is free; `false` once the semaphore is closed.
    fn admit(&self) -> bool {
        match futures::executor::block_on(self.permits.acquire()) {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_closed) => false,
        }
    }

    fn track(self: &Arc<Self>, index: usize, child: Stage<T>) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, child.downgrade());
        if self.cancelled.load(Ordering::Acquire) {
            child.cancel();
        }

        let this = Arc::clone(self);
        child.when_done(move |outcome| {
            this.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&index);
            this.permits.add_permits(1);
            this.job.record(outcome);
        });
    }

    /// Accounts `n` factories that were never invoked.
    fn skip(&self, n: usize) {
        for _ in 0..n {
            self.job.expect();
            self.job.record(Outcome::Cancelled);
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.permits.close();
        let children: Vec<WeakStage<T>> = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, child)| child)
            .collect();
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    }
}

/// Creates children lazily from `factories`, keeping at most `parallelism` in
/// flight, and streams their values into `collector`.
///
/// The driver runs on `executor` when one is given, otherwise on the calling
/// thread (which then blocks whenever all permits are taken). A `parallelism`
/// of 0 is treated as 1.
///
/// Cancelling the returned stage stops admitting factories, cancels the
/// children in flight and counts the factories never invoked as cancelled;
/// `collector.end` still runs exactly once. A panicking factory counts as a
/// failed child and does not leak its permit.
pub fn eventually_collect_with<T, U, I, F, C>(
    caller: Arc<dyn Caller>,
    executor: Option<Arc<dyn Executor>>,
    factories: I,
    collector: C,
    parallelism: usize,
) -> Stage<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    I: IntoIterator<Item = F>,
    I::IntoIter: Send + 'static,
    F: FnOnce() -> Stage<T> + Send + 'static,
    C: StreamCollector<T, U>,
{
    let target = Stage::pending(caller);
    let coordinator = Arc::new(Coordinator {
        job: StreamJob::new(target.clone(), collector, 1),
        permits: Semaphore::new(parallelism.max(1)),
        cancelled: AtomicBool::new(false),
        in_flight: Mutex::new(HashMap::new()),
    });

    let on_cancel = Arc::clone(&coordinator);
    target.when_cancelled(move || on_cancel.cancel());

    let factories = factories.into_iter();
    match executor {
        Some(executor) => executor.execute(Box::new(move || coordinator.drive(factories))),
        None => coordinator.drive(factories),
    }
    target
}

/// [`eventually_collect_with`] over two closures: `on_value` sees every
/// completed child, `finish` turns the final [`Counts`] into the result.
pub fn eventually_collect<T, U, I, F, V, E>(
    caller: Arc<dyn Caller>,
    executor: Option<Arc<dyn Executor>>,
    factories: I,
    on_value: V,
    finish: E,
    parallelism: usize,
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
    eventually_collect_with(
        caller,
        executor,
        factories,
        fn_collector(on_value, finish),
        parallelism,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::DirectCaller;
    use crate::error::{Cause, CollectError};
    use crate::runtime::TokioExecutor;
    use crate::subscribers::SubscriberSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn caller() -> Arc<dyn Caller> {
        Arc::new(DirectCaller::new(SubscriberSet::empty()))
    }

    #[derive(Default)]
    struct Tally {
        values: AtomicUsize,
        ended: Mutex<Option<Counts>>,
    }

    impl StreamCollector<usize, Counts> for Arc<Tally> {
        fn completed(&self, _value: usize) {
            self.values.fetch_add(1, Ordering::SeqCst);
        }

        fn end(&self, counts: Counts) -> Result<Counts, Cause> {
            *self.ended.lock().unwrap() = Some(counts);
            Ok(counts)
        }
    }

    fn factory_panics() -> Stage<usize> {
        panic!("factory")
    }

    #[test]
    fn test_parallelism_is_never_exceeded() {
        const TOTAL: usize = 10_000;
        const PARALLELISM: usize = 8;

        let c = caller();
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel::<Stage<usize>>();

        let worker_live = live.clone();
        let worker = thread::spawn(move || {
            for stage in rx {
                worker_live.fetch_sub(1, Ordering::SeqCst);
                stage.complete(1);
            }
        });

        let factories = (0..TOTAL).map({
            let c = c.clone();
            let live = live.clone();
            let peak = peak.clone();
            move |_| {
                let c = c.clone();
                let live = live.clone();
                let peak = peak.clone();
                let tx = tx.clone();
                move || {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let stage = Stage::pending(c);
                    tx.send(stage.clone()).unwrap();
                    stage
                }
            }
        });

        let tally = Arc::new(Tally::default());
        let out = eventually_collect_with(c, None, factories, tally.clone(), PARALLELISM);

        let counts = out.join_timeout(Duration::from_secs(60)).unwrap();
        assert_eq!(counts, Counts { completed: TOTAL, failed: 0, cancelled: 0 });
        assert!(peak.load(Ordering::SeqCst) <= PARALLELISM);
        assert_eq!(tally.values.load(Ordering::SeqCst), TOTAL);

        worker.join().unwrap();
    }

    #[test]
    fn test_factory_panic_counts_as_failure_without_leaking_permit() {
        let c = caller();
        let factories: Vec<Box<dyn FnOnce() -> Stage<usize> + Send>> = vec![
            Box::new(factory_panics),
            Box::new({
                let c = c.clone();
                move || Stage::completed(c, 1)
            }),
            Box::new({
                let c = c.clone();
                move || Stage::completed(c, 2)
            }),
        ];
        let tally = Arc::new(Tally::default());

        let out = eventually_collect_with(c, None, factories, tally.clone(), 1);

        let cause = out.cause().unwrap();
        assert!(matches!(
            cause.downcast_ref::<CollectError>(),
            Some(CollectError::Failed { failed: 1, total: 3 })
        ));
        assert!(cause.suppressed()[0].is_panic());
        assert_eq!(
            *tally.ended.lock().unwrap(),
            Some(Counts { completed: 2, failed: 1, cancelled: 0 })
        );
    }

    #[test]
    fn test_cancel_stops_admission_and_reports_counts() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let c = caller();
        let created = Arc::new(Mutex::new(Vec::new()));

        let factories = (0..100).map({
            let c = c.clone();
            let created = created.clone();
            move |_| {
                let c = c.clone();
                let created = created.clone();
                move || {
                    let stage = Stage::<usize>::pending(c);
                    created.lock().unwrap().push(stage.clone());
                    stage
                }
            }
        });
        let tally = Arc::new(Tally::default());
        let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::new(rt.handle().clone()));
        let out = eventually_collect_with(c, Some(executor), factories, tally.clone(), 4);

        while created.lock().unwrap().len() < 4 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(out.cancel());

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while tally.ended.lock().unwrap().is_none() {
            assert!(std::time::Instant::now() < deadline, "collector never ended");
            thread::sleep(Duration::from_millis(1));
        }

        let counts = (*tally.ended.lock().unwrap()).unwrap();
        assert_eq!(counts, Counts { completed: 0, failed: 0, cancelled: 100 });
        assert_eq!(created.lock().unwrap().len(), 4);
        assert!(created.lock().unwrap().iter().all(Stage::is_cancelled));
    }

    #[test]
    fn test_empty_factories_finish_immediately() {
        let c = caller();
        let tally = Arc::new(Tally::default());
        let out = eventually_collect_with(
            c,
            None,
            Vec::<fn() -> Stage<usize>>::new(),
            tally,
            4,
        );
        assert_eq!(out.join_now().unwrap(), Counts::default());
    }

    #[test]
    fn test_closure_form_sums_values() {
        let c = caller();
        let sum = Arc::new(AtomicUsize::new(0));
        let factories = (1..=10).map({
            let c = c.clone();
            move |n: usize| {
                let c = c.clone();
                move || Stage::completed(c, n)
            }
        });

        let seen = sum.clone();
        let out = eventually_collect(
            c,
            None,
            factories,
            move |n: usize| {
                seen.fetch_add(n, Ordering::SeqCst);
            },
            |counts: Counts| counts.completed,
            3,
        );

        assert_eq!(out.join_now().unwrap(), 10);
        assert_eq!(sum.load(Ordering::SeqCst), 55);
    }
}
