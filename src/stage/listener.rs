//! # Listener variants.
//!
//! A listener is stored while its stage is pending and turned into a unit of
//! [`Work`] exactly once, when the outcome is known. Listeners that do not care
//! about the decided outcome produce no work at all, and only listeners that
//! receive the value clone it.

use crate::error::Cause;
use crate::runtime::Work;
use crate::stage::Outcome;

/// Something that can be cancelled without knowing its value type.
pub(crate) trait Cancel: Send + Sync {
    fn cancel(&self) -> bool;
}

/// Handler registered on a pending stage.
pub(crate) enum Listener<T> {
    /// Any terminal outcome, with the full outcome.
    Done(Box<dyn FnOnce(Outcome<T>) + Send>),
    /// Any terminal outcome, no payload.
    Finished(Box<dyn FnOnce() + Send>),
    /// Completed only, with the value.
    Completed(Box<dyn FnOnce(T) + Send>),
    /// Failed only, with the cause.
    Failed(Box<dyn FnOnce(Cause) + Send>),
    /// Cancelled only.
    Cancelled(Box<dyn FnOnce() + Send>),
    /// Cancel another stage when this one is cancelled.
    Bind(Box<dyn Cancel>),
}

impl<T: Clone + Send + 'static> Listener<T> {
    /// Work to run for `outcome`, or `None` if the listener does not apply.
    pub(crate) fn into_work(self, outcome: &Outcome<T>) -> Option<Work> {
        match (self, outcome) {
            (Listener::Done(f), o) => {
                let o = o.clone();
                Some(Box::new(move || f(o)))
            }
            (Listener::Finished(f), _) => Some(f),
            (Listener::Completed(f), Outcome::Completed(v)) => {
                let v = v.clone();
                Some(Box::new(move || f(v)))
            }
            (Listener::Failed(f), Outcome::Failed(c)) => {
                let c = c.clone();
                Some(Box::new(move || f(c)))
            }
            (Listener::Cancelled(f), Outcome::Cancelled) => Some(f),
            (Listener::Bind(other), Outcome::Cancelled) => Some(Box::new(move || {
                other.cancel();
            })),
            _ => None,
        }
    }
}
