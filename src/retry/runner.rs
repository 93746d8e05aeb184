//! # Retry runner: re-invoke an action until it completes.
//!
//! Drives one action against one [`RetryDecisions`] stream and completes a
//! single target stage.
//!
//! ## Flow
//! ```text
//! attempt():
//! loop {
//!   ├─► target finished? → return
//!   ├─► stage = guard(action)           (panic → failed attempt)
//!   ├─► stage pending  → on done: decide(outcome) → Now? attempt()
//!   └─► stage terminal → decide(outcome) inline
//!         ├─ Completed(v) → target.complete(RetryResult { v, errors })
//!         ├─ Cancelled    → target.cancel()
//!         └─ Failed(c)    → decisions.next()
//!               ├─ stop           → publish RetryExhausted, target.fail(c + prior causes)
//!               ├─ backoff == 0   → record, continue loop (same thread)
//!               └─ backoff > 0    → record, publish RetryScheduled,
//!                                   scheduler.schedule(backoff, attempt)
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially**; the next one starts only after the
//!   previous outcome was decided.
//! - Immediate retries loop instead of recursing.
//! - Finishing the target (e.g. cancelling it) cancels a pending timer and the
//!   attempt in flight. Only the latest attempt is tracked, weakly, so a long
//!   run holds no per-attempt state on the target.
//! - The run lock is never held while calling the action or the scheduler.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::caller::{Caller, guard};
use crate::error::{Cause, RetryError};
use crate::events::{Event, EventKind};
use crate::retry::{RetryAttempt, RetryDecisions, RetryPolicy, RetryResult};
use crate::runtime::{Clock, Scheduled, Scheduler};
use crate::stage::{Outcome, Stage, WeakStage};

const CONTEXT: &str = "retry_until_completed";

enum Next {
    /// Run the next attempt right away.
    Now,
    /// The run is over or a timer owns the next attempt.
    Parked,
}

struct RunState<T> {
    decisions: RetryDecisions,
    errors: Vec<RetryAttempt>,
    scheduled: Option<Scheduled>,
    in_flight: Option<WeakStage<T>>,
}

struct Run<T, F> {
    caller: Arc<dyn Caller>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Arc<dyn Scheduler>>,
    action: F,
    started: Instant,
    target: Stage<RetryResult<T>>,
    state: Mutex<RunState<T>>,
}

impl<T, F> Run<T, F>
where
    T: Clone + Send + 'static,
    F: Fn() -> Stage<T> + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, RunState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attempt(self: &Arc<Self>) {
        loop {
            if self.target.is_done() {
                return;
            }

            let stage = match guard(|| (self.action)()) {
                Ok(stage) => stage,
                Err(cause) => Stage::failed(self.caller.clone(), cause),
            };

            match stage.outcome() {
                Some(outcome) => match self.decide(outcome) {
                    Next::Now => continue,
                    Next::Parked => return,
                },
                None => {
                    self.track(&stage);
                    let this = Arc::clone(self);
                    stage.when_done(move |outcome| {
                        this.lock().in_flight = None;
                        if let Next::Now = this.decide(outcome) {
                            this.attempt();
                        }
                    });
                    return;
                }
            }
        }
    }

    fn decide(self: &Arc<Self>, outcome: Outcome<T>) -> Next {
        match outcome {
            Outcome::Completed(value) => {
                let errors = mem::take(&mut self.lock().errors);
                self.target.complete(RetryResult { value, errors });
                Next::Parked
            }
            Outcome::Cancelled => {
                self.target.cancel();
                Next::Parked
            }
            Outcome::Failed(cause) => self.on_failure(cause),
        }
    }

    fn on_failure(self: &Arc<Self>, cause: Cause) -> Next {
        let (decision, attempt) = {
            let mut state = self.lock();
            let decision = state.decisions.next();
            (decision, state.errors.len() as u32 + 1)
        };

        if !decision.should_retry {
            self.caller.publish(
                Event::now(EventKind::RetryExhausted)
                    .with_context(CONTEXT)
                    .with_cause(cause.clone())
                    .with_attempt(attempt),
            );
            let prior = self.take_causes();
            self.target.fail(cause.with_suppressed(prior));
            return Next::Parked;
        }

        let offset = self.clock.now().saturating_duration_since(self.started);
        self.lock().errors.push(RetryAttempt {
            offset,
            cause: cause.clone(),
        });

        let backoff = decision.backoff;
        if backoff.is_zero() {
            return Next::Now;
        }

        let Some(scheduler) = &self.scheduler else {
            let prior = self.take_causes();
            self.target
                .fail(Cause::new(RetryError::NoScheduler { backoff }).with_suppressed(prior));
            return Next::Parked;
        };

        self.caller.publish(
            Event::now(EventKind::RetryScheduled)
                .with_context(CONTEXT)
                .with_cause(cause)
                .with_attempt(attempt)
                .with_delay(backoff),
        );
        self.schedule(scheduler.as_ref(), backoff);
        Next::Parked
    }

    fn schedule(self: &Arc<Self>, scheduler: &dyn Scheduler, backoff: Duration) {
        let this = Arc::clone(self);
        let handle = scheduler.schedule(backoff, Box::new(move || this.attempt()));

        self.lock().scheduled = Some(handle.clone());
        if self.target.is_done() {
            handle.cancel();
        }
    }

    /// Remembers the pending attempt so cancelling the target reaches it.
    fn track(&self, stage: &Stage<T>) {
        self.lock().in_flight = Some(stage.downgrade());
        if self.target.is_done() {
            stage.cancel();
        }
    }

    fn take_causes(&self) -> Vec<Cause> {
        mem::take(&mut self.lock().errors)
            .into_iter()
            .map(|attempt| attempt.cause)
            .collect()
    }

    fn cancel_pending(&self) {
        let (scheduled, in_flight) = {
            let mut state = self.lock();
            (state.scheduled.take(), state.in_flight.take())
        };
        if let Some(handle) = scheduled {
            handle.cancel();
        }
        if let Some(stage) = in_flight.and_then(|weak| weak.upgrade()) {
            stage.cancel();
        }
    }
}

/// Invokes `action` until one of its stages completes, retrying failures as
/// `policy` decides.
///
/// On success the result carries the value and every earlier failure with its
/// offset from the start of the run. When the policy gives up, the result
/// fails with the last cause; every earlier cause is attached as suppressed,
/// oldest first. A panicking action counts as a failed attempt; a cancelled
/// attempt cancels the result.
///
/// Positive backoffs need a `scheduler`; without one the run fails with
/// [`RetryError::NoScheduler`]. Zero backoffs retry on the same thread.
///
/// Cancelling the returned stage cancels the pending timer or the attempt in
/// flight.
pub fn retry_until_completed<T, F>(
    caller: Arc<dyn Caller>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Arc<dyn Scheduler>>,
    policy: &RetryPolicy,
    action: F,
) -> Stage<RetryResult<T>>
where
    T: Clone + Send + 'static,
    F: Fn() -> Stage<T> + Send + Sync + 'static,
{
    let target = Stage::pending(caller.clone());
    let run = Arc::new(Run {
        caller,
        started: clock.now(),
        state: Mutex::new(RunState {
            decisions: policy.instance(Arc::clone(&clock)),
            errors: Vec::new(),
            scheduled: None,
            in_flight: None,
        }),
        clock,
        scheduler,
        action,
        target: target.clone(),
    });

    let weak = Arc::downgrade(&run);
    target.when_finished(move || {
        if let Some(run) = weak.upgrade() {
            run.cancel_pending();
        }
    });

    run.attempt();
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::DirectCaller;
    use crate::error::JoinError;
    use crate::runtime::{ManualClock, SystemClock, TokioScheduler, Work};
    use crate::subscribers::{Subscribe, SubscriberSet};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MS: Duration = Duration::from_millis(1);

    fn caller() -> Arc<dyn Caller> {
        Arc::new(DirectCaller::new(SubscriberSet::empty()))
    }

    /// Records requested delays; the test runs the queued work by hand.
    #[derive(Default)]
    struct Recording {
        delays: Mutex<Vec<Duration>>,
        queue: Mutex<VecDeque<Work>>,
        handles: Mutex<Vec<Scheduled>>,
    }

    impl Scheduler for Recording {
        fn schedule(&self, delay: Duration, work: Work) -> Scheduled {
            self.delays.lock().unwrap().push(delay);
            self.queue.lock().unwrap().push_back(work);
            let handle = Scheduled::new();
            self.handles.lock().unwrap().push(handle.clone());
            handle
        }
    }

    impl Recording {
        fn run_all(&self) {
            loop {
                let next = self.queue.lock().unwrap().pop_front();
                match next {
                    Some(work) => work(),
                    None => return,
                }
            }
        }
    }

    fn failing_until(
        c: Arc<dyn Caller>,
        failures: usize,
    ) -> (Arc<AtomicUsize>, impl Fn() -> Stage<usize> + Send + Sync + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let action = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n > failures {
                Stage::completed(c.clone(), n)
            } else {
                Stage::failed(c.clone(), format!("attempt {n}"))
            }
        };
        (calls, action)
    }

    #[test]
    fn test_zero_backoff_retries_inline() {
        let c = caller();
        let (calls, action) = failing_until(c.clone(), 3);
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            None,
            &RetryPolicy::linear(Duration::ZERO),
            action,
        );

        let result = out.join_now().unwrap();
        assert_eq!(result.value, 4);
        assert_eq!(result.attempts(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let messages: Vec<_> = result.errors.iter().map(|e| e.cause.to_string()).collect();
        assert_eq!(messages, vec!["attempt 1", "attempt 2", "attempt 3"]);
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let c = caller();
        let scheduler = Arc::new(Recording::default());
        let (_, action) = failing_until(c.clone(), 8);
        let out = retry_until_completed(
            c,
            Arc::new(ManualClock::new()),
            Some(scheduler.clone() as Arc<dyn Scheduler>),
            &RetryPolicy::exponential(100 * MS, 2.0, 3200 * MS),
            action,
        );

        scheduler.run_all();

        assert_eq!(out.join_now().unwrap().value, 9);
        let delays: Vec<_> = scheduler
            .delays
            .lock()
            .unwrap()
            .iter()
            .map(Duration::as_millis)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3200, 3200, 3200]);
    }

    #[test]
    fn test_exhaustion_carries_prior_causes_in_order() {
        let c = caller();
        let clock = ManualClock::new();
        let causes = Arc::new(Mutex::new(Vec::new()));
        let (ticking, recorded, ac) = (clock.clone(), causes.clone(), c.clone());

        let out = retry_until_completed(
            c,
            Arc::new(clock),
            None,
            &RetryPolicy::timed(100 * MS, RetryPolicy::linear(Duration::ZERO)),
            move || {
                ticking.advance(30 * MS);
                let cause = Cause::msg("down");
                recorded.lock().unwrap().push(cause.clone());
                Stage::<u32>::failed(ac.clone(), cause)
            },
        );

        let causes = causes.lock().unwrap();
        assert_eq!(causes.len(), 4);
        let err = out.join_now().unwrap_err();
        let last = err.cause().unwrap();
        assert!(last.same_error(&causes[3]));
        assert_eq!(last.suppressed().len(), 3);
        for (suppressed, expected) in last.suppressed().iter().zip(causes.iter()) {
            assert!(suppressed.same_error(expected));
        }
    }

    #[test]
    fn test_timed_policy_against_real_timer() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let c = caller();
        let causes = Arc::new(Mutex::new(Vec::new()));
        let (recorded, ac) = (causes.clone(), c.clone());

        let started = Instant::now();
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            Some(Arc::new(TokioScheduler::new(rt.handle().clone()))),
            &RetryPolicy::timed(1000 * MS, RetryPolicy::linear(50 * MS)),
            move || {
                let cause = Cause::msg("unavailable");
                recorded.lock().unwrap().push(cause.clone());
                Stage::<u32>::failed(ac.clone(), cause)
            },
        );

        let err = out.join_timeout(Duration::from_secs(10)).unwrap_err();
        let elapsed = started.elapsed();
        assert!(elapsed >= 1000 * MS, "{elapsed:?}");
        assert!(elapsed < 1000 * MS + 50 * MS + 250 * MS, "{elapsed:?}");

        let causes = causes.lock().unwrap();
        let last = err.cause().unwrap();
        assert!(last.same_error(causes.last().unwrap()));
        assert_eq!(last.suppressed().len(), causes.len() - 1);
        assert!(last.suppressed()[0].same_error(&causes[0]));
    }

    #[test]
    fn test_positive_backoff_without_scheduler_fails() {
        let c = caller();
        let (_, action) = failing_until(c.clone(), 10);
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            None,
            &RetryPolicy::linear(10 * MS),
            action,
        );
        let cause = out.cause().unwrap();
        assert_eq!(
            cause.downcast_ref::<RetryError>(),
            Some(&RetryError::NoScheduler { backoff: 10 * MS })
        );
        assert_eq!(cause.suppressed().len(), 1);
    }

    #[test]
    fn test_cancel_target_cancels_timer() {
        let c = caller();
        let scheduler = Arc::new(Recording::default());
        let (calls, action) = failing_until(c.clone(), 10);
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            Some(scheduler.clone() as Arc<dyn Scheduler>),
            &RetryPolicy::linear(10 * MS),
            action,
        );

        assert!(out.cancel());
        assert!(scheduler.handles.lock().unwrap()[0].is_cancelled());

        scheduler.run_all();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(out.join_now(), Err(JoinError::Cancelled)));
    }

    #[test]
    fn test_panicking_action_counts_as_failure() {
        let c = caller();
        let calls = Arc::new(AtomicUsize::new(0));
        let (counter, ac) = (calls.clone(), c.clone());
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            None,
            &RetryPolicy::linear(Duration::ZERO),
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first attempt");
                }
                Stage::completed(ac.clone(), "ok")
            },
        );

        let result = out.join_now().unwrap();
        assert_eq!(result.value, "ok");
        assert!(result.errors[0].cause.is_panic());
    }

    #[test]
    fn test_cancelled_attempt_cancels_target() {
        let c = caller();
        let attempt = Stage::<u32>::pending(c.clone());
        let handle = attempt.clone();
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            None,
            &RetryPolicy::linear(Duration::ZERO),
            move || handle.clone(),
        );

        assert!(!out.is_done());
        attempt.cancel();
        assert!(out.is_cancelled());
    }

    #[test]
    fn test_async_failures_do_not_grow_target_listeners() {
        let c = caller();
        let attempts = Arc::new(Mutex::new(Vec::<Stage<u32>>::new()));
        let (recorded, ac) = (attempts.clone(), c.clone());
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            None,
            &RetryPolicy::linear(Duration::ZERO),
            move || {
                let stage = Stage::pending(ac.clone());
                recorded.lock().unwrap().push(stage.clone());
                stage
            },
        );

        for n in 0..1_000 {
            let current = attempts.lock().unwrap()[n].clone();
            current.fail("transient");
        }

        assert_eq!(attempts.lock().unwrap().len(), 1_001);
        assert_eq!(
            format!("{out:?}"),
            r#"Stage { state: "pending", listeners: 1 }"#
        );

        out.cancel();
        assert!(attempts.lock().unwrap()[1_000].is_cancelled());
    }

    #[test]
    fn test_pending_attempt_is_cancelled_with_target() {
        let c = caller();
        let attempt = Stage::<u32>::pending(c.clone());
        let handle = attempt.clone();
        let out = retry_until_completed(
            c,
            Arc::new(SystemClock),
            None,
            &RetryPolicy::linear(Duration::ZERO),
            move || handle.clone(),
        );

        out.cancel();
        assert!(attempt.is_cancelled());
    }

    #[derive(Default)]
    struct Kinds(Mutex<Vec<EventKind>>);

    impl Subscribe for Kinds {
        fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind);
        }
    }

    #[test]
    fn test_publishes_retry_events() {
        let kinds = Arc::new(Kinds::default());
        let subscribers = SubscriberSet::new(vec![kinds.clone()]);
        let c: Arc<dyn Caller> = Arc::new(DirectCaller::new(subscribers));
        let clock = ManualClock::new();
        let scheduler = Arc::new(Recording::default());
        let (ticking, ac) = (clock.clone(), c.clone());

        let out = retry_until_completed(
            c,
            Arc::new(clock),
            Some(scheduler.clone() as Arc<dyn Scheduler>),
            &RetryPolicy::timed(25 * MS, RetryPolicy::linear(10 * MS)),
            move || {
                ticking.advance(10 * MS);
                Stage::<u32>::failed(ac.clone(), "nope")
            },
        );
        scheduler.run_all();

        assert!(out.is_failed());
        assert_eq!(
            *kinds.0.lock().unwrap(),
            vec![
                EventKind::RetryScheduled,
                EventKind::RetryScheduled,
                EventKind::RetryExhausted
            ]
        );
    }
}
