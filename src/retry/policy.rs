//! # Retry policies and their per-run decision streams.
//!
//! A [`RetryPolicy`] is a stateless description. Each retry run calls
//! [`RetryPolicy::instance`] to get a fresh [`RetryDecisions`], which keeps the
//! per-run state (attempt counter, deadline, previous jittered delay) and
//! answers one [`RetryDecision`] per failed attempt.
//!
//! ```text
//! Linear(b)              b, b, b, …
//! Exponential(b, f, m)   b, b·f, b·f², …, m, m, m      (capped: stop computing powers)
//! Timed(t, inner)        inner's decision, vetoed once clock ≥ start + t
//! Jittered(j, inner)     inner's decision, backoff randomized by j
//! ```
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stagecraft::{RetryPolicy, SystemClock};
//!
//! let policy = RetryPolicy::exponential(
//!     Duration::from_millis(100),
//!     2.0,
//!     Duration::from_millis(400),
//! );
//! let mut decisions = policy.instance(Arc::new(SystemClock));
//! let delays: Vec<_> = (0..4).map(|_| decisions.next().backoff).collect();
//! assert_eq!(delays, [100, 200, 400, 400].map(Duration::from_millis));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::retry::JitterPolicy;
use crate::runtime::Clock;

/// Answer to "should the failed attempt be retried, and after how long?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    /// `false` ends the run with the last failure.
    pub should_retry: bool,
    /// Delay before the next attempt; zero retries on the same thread.
    pub backoff: Duration,
}

impl RetryDecision {
    /// Retry after `backoff`.
    pub fn retry(backoff: Duration) -> Self {
        Self {
            should_retry: true,
            backoff,
        }
    }

    /// Give up.
    pub fn stop() -> Self {
        Self {
            should_retry: false,
            backoff: Duration::ZERO,
        }
    }
}

/// Stateless retry policy; see the module docs for the variants.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Always retry after the same backoff.
    Linear {
        /// Delay between attempts.
        backoff: Duration,
    },

    /// Retry after `base × factor^n` for the n-th failure, capped at `max`.
    Exponential {
        /// Delay after the first failure.
        base: Duration,
        /// Growth factor per failure.
        factor: f64,
        /// Upper bound; once reached it is returned for every later failure.
        max: Duration,
    },

    /// Defer to `inner` until `timeout` has passed since the run started.
    Timed {
        /// Budget measured from [`RetryPolicy::instance`].
        timeout: Duration,
        /// Policy deciding within the budget.
        inner: Box<RetryPolicy>,
    },

    /// Defer to `inner`, randomizing its backoff.
    Jittered {
        /// Randomization to apply.
        jitter: JitterPolicy,
        /// Policy deciding whether to retry.
        inner: Box<RetryPolicy>,
    },
}

impl RetryPolicy {
    /// Constant backoff.
    pub fn linear(backoff: Duration) -> Self {
        RetryPolicy::Linear { backoff }
    }

    /// Exponential backoff `base × factor^n`, capped at `max`.
    pub fn exponential(base: Duration, factor: f64, max: Duration) -> Self {
        RetryPolicy::Exponential { base, factor, max }
    }

    /// Stops retrying once `timeout` has elapsed, whatever `inner` says.
    pub fn timed(timeout: Duration, inner: RetryPolicy) -> Self {
        RetryPolicy::Timed {
            timeout,
            inner: Box::new(inner),
        }
    }

    /// Randomizes the backoff of `inner`.
    pub fn jittered(jitter: JitterPolicy, inner: RetryPolicy) -> Self {
        RetryPolicy::Jittered {
            jitter,
            inner: Box::new(inner),
        }
    }

    /// Starts a fresh decision stream; deadlines are measured from now on `clock`.
    pub fn instance(&self, clock: Arc<dyn Clock>) -> RetryDecisions {
        RetryDecisions {
            state: State::new(self, &clock),
        }
    }
}

enum State {
    Linear {
        backoff: Duration,
    },
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        failures: i32,
        capped: bool,
    },
    Timed {
        deadline: Instant,
        clock: Arc<dyn Clock>,
        inner: Box<State>,
    },
    Jittered {
        jitter: JitterPolicy,
        prev: Option<Duration>,
        inner: Box<State>,
    },
}

impl State {
    fn new(policy: &RetryPolicy, clock: &Arc<dyn Clock>) -> Self {
        match policy {
            RetryPolicy::Linear { backoff } => State::Linear { backoff: *backoff },
            RetryPolicy::Exponential { base, factor, max } => State::Exponential {
                base: *base,
                factor: *factor,
                max: *max,
                failures: 0,
                capped: false,
            },
            RetryPolicy::Timed { timeout, inner } => State::Timed {
                deadline: clock.now() + *timeout,
                clock: Arc::clone(clock),
                inner: Box::new(State::new(inner, clock)),
            },
            RetryPolicy::Jittered { jitter, inner } => State::Jittered {
                jitter: *jitter,
                prev: None,
                inner: Box::new(State::new(inner, clock)),
            },
        }
    }

    fn next(&mut self) -> RetryDecision {
        match self {
            State::Linear { backoff } => RetryDecision::retry(*backoff),

            State::Exponential {
                base,
                factor,
                max,
                failures,
                capped,
            } => {
                if *capped {
                    return RetryDecision::retry(*max);
                }
                let nanos = base.as_nanos() as f64 * factor.powi(*failures);
                if !nanos.is_finite() || nanos < 0.0 || nanos >= max.as_nanos() as f64 {
                    *capped = true;
                    return RetryDecision::retry(*max);
                }
                *failures = failures.saturating_add(1);
                RetryDecision::retry(Duration::from_nanos(nanos as u64))
            }

            State::Timed {
                deadline,
                clock,
                inner,
            } => {
                let decision = inner.next();
                if clock.now() >= *deadline {
                    return RetryDecision::stop();
                }
                decision
            }

            State::Jittered {
                jitter,
                prev,
                inner,
            } => {
                let decision = inner.next();
                if !decision.should_retry {
                    return decision;
                }
                let backoff = decision.backoff;
                let jittered = jitter.decorrelated(
                    backoff,
                    prev.unwrap_or(backoff),
                    backoff.saturating_mul(3),
                );
                *prev = Some(jittered);
                RetryDecision::retry(jittered)
            }
        }
    }
}

/// Per-run decision stream produced by [`RetryPolicy::instance`].
pub struct RetryDecisions {
    state: State,
}

impl RetryDecisions {
    /// Decision for the next failed attempt.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> RetryDecision {
        self.state.next()
    }
}

impl fmt::Debug for RetryDecisions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryDecisions").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ManualClock, SystemClock};

    const MS: Duration = Duration::from_millis(1);

    fn system() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }

    #[test]
    fn test_linear_is_constant() {
        let mut d = RetryPolicy::linear(50 * MS).instance(system());
        for _ in 0..10 {
            assert_eq!(d.next(), RetryDecision::retry(50 * MS));
        }
    }

    #[test]
    fn test_exponential_caps_and_stays_capped() {
        let mut d = RetryPolicy::exponential(100 * MS, 2.0, 3200 * MS).instance(system());
        let delays: Vec<_> = (0..9).map(|_| d.next().backoff.as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3200, 3200, 3200, 3200]);
    }

    #[test]
    fn test_exponential_survives_overflow() {
        let mut d = RetryPolicy::exponential(MS, 1e300, 10 * MS).instance(system());
        assert_eq!(d.next().backoff, MS);
        for _ in 0..1_000 {
            assert_eq!(d.next(), RetryDecision::retry(10 * MS));
        }
    }

    #[test]
    fn test_shrinking_exponential_counter_saturates() {
        let mut state = State::Exponential {
            base: 100 * MS,
            factor: 0.5,
            max: 3200 * MS,
            failures: i32::MAX - 1,
            capped: false,
        };
        for _ in 0..4 {
            assert_eq!(state.next(), RetryDecision::retry(Duration::ZERO));
        }
        assert!(matches!(state, State::Exponential { failures: i32::MAX, .. }));

        let mut d = RetryPolicy::exponential(100 * MS, 0.5, 3200 * MS).instance(system());
        let delays: Vec<_> = (0..4).map(|_| d.next().backoff.as_millis()).collect();
        assert_eq!(delays, vec![100, 50, 25, 12]);
    }

    #[test]
    fn test_timed_vetoes_after_deadline() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::timed(1000 * MS, RetryPolicy::linear(50 * MS));
        let mut d = policy.instance(Arc::new(clock.clone()));

        clock.advance(999 * MS);
        assert_eq!(d.next(), RetryDecision::retry(50 * MS));
        clock.advance(MS);
        assert_eq!(d.next(), RetryDecision::stop());
    }

    #[test]
    fn test_each_instance_has_its_own_state() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::timed(100 * MS, RetryPolicy::exponential(MS, 2.0, 8 * MS));

        let mut first = policy.instance(Arc::new(clock.clone()));
        assert_eq!(first.next().backoff, MS);
        assert_eq!(first.next().backoff, 2 * MS);

        clock.advance(100 * MS);
        assert!(!first.next().should_retry);

        let mut second = policy.instance(Arc::new(clock.clone()));
        assert_eq!(second.next(), RetryDecision::retry(MS));
    }

    #[test]
    fn test_jitter_keeps_decision() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::jittered(
            JitterPolicy::Equal,
            RetryPolicy::timed(10 * MS, RetryPolicy::linear(100 * MS)),
        );
        let mut d = policy.instance(Arc::new(clock.clone()));
        for _ in 0..50 {
            let decision = d.next();
            assert!(decision.should_retry);
            assert!(decision.backoff >= 50 * MS && decision.backoff <= 100 * MS);
        }
        clock.advance(10 * MS);
        assert_eq!(d.next(), RetryDecision::stop());
    }

    #[test]
    fn test_decorrelated_never_below_inner_backoff() {
        let policy = RetryPolicy::jittered(
            JitterPolicy::Decorrelated,
            RetryPolicy::exponential(10 * MS, 2.0, 80 * MS),
        );
        let mut d = policy.instance(system());
        for base in [10, 20, 40, 80, 80, 80].map(|n: u32| n * MS) {
            let decision = d.next();
            assert!(decision.backoff >= base, "{:?} < {:?}", decision.backoff, base);
            assert!(decision.backoff <= base * 3);
        }
    }
}
