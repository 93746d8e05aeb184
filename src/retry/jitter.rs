//! # Jitter for retry backoff.
//!
//! [`JitterPolicy`] randomizes a backoff so that many callers failing at the
//! same moment do not retry in lockstep.
//!
//! - [`JitterPolicy::None`]         the backoff as computed
//! - [`JitterPolicy::Full`]         uniform in `[0, backoff]`
//! - [`JitterPolicy::Equal`]        `backoff/2 + uniform[0, backoff/2]`
//! - [`JitterPolicy::Decorrelated`] uniform in `[backoff, min(prev × 3, cap)]`, tracks the previous delay

use std::time::Duration;

use rand::Rng;

/// Randomization applied on top of a retry backoff.
///
/// Jitter only ever changes *how long* to wait, never *whether* to retry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the backoff unchanged.
    #[default]
    None,

    /// Uniform in `[0, backoff]`. Spreads load the most; may retry immediately.
    Full,

    /// `backoff/2 + uniform[0, backoff/2]`. Keeps at least half the backoff.
    Equal,

    /// Uniform in `[backoff, min(prev × 3, cap)]`, where `prev` is the previous
    /// jittered delay. Never below the policy's own backoff.
    Decorrelated,
}

impl JitterPolicy {
    /// Jitters a single backoff without history.
    ///
    /// `Decorrelated` needs the previous delay; see [`decorrelated`](Self::decorrelated).
    pub fn apply(&self, backoff: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => backoff,
            JitterPolicy::Full => uniform(Duration::ZERO, backoff),
            JitterPolicy::Equal => {
                let half = backoff / 2;
                half + uniform(Duration::ZERO, backoff - half)
            }
        }
    }

    /// Decorrelated jitter given the previous delay and an upper cap.
    ///
    /// Other policies ignore `prev` and `cap` and behave like [`apply`](Self::apply).
    pub fn decorrelated(&self, backoff: Duration, prev: Duration, cap: Duration) -> Duration {
        if *self != JitterPolicy::Decorrelated {
            return self.apply(backoff);
        }
        let upper = prev.saturating_mul(3).min(cap).max(backoff);
        uniform(backoff, upper)
    }
}

/// Uniform duration in `[lo, hi]` at nanosecond resolution.
fn uniform(lo: Duration, hi: Duration) -> Duration {
    if hi <= lo {
        return lo;
    }
    let lo_ns = u64::try_from(lo.as_nanos()).unwrap_or(u64::MAX);
    let hi_ns = u64::try_from(hi.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::rng().random_range(lo_ns..=hi_ns))
}
