//! # Derived stages.
//!
//! Every transform creates a pending *target* stage on the same caller,
//! binds it to the source (cancelling the target cancels the source) and
//! registers one internal listener on the source:
//!
//! ```text
//! source ──when_done──► match outcome
//!                        ├─ handled variant  → guard(f) ──► target.complete / fail
//!                        │                    (compose: f's stage ──forward──► target)
//!                        └─ other variants   → copied onto target unchanged
//! ```
//!
//! A panic inside the user function fails the target; the source is never
//! touched by it.

use crate::caller::guard;
use crate::error::Cause;
use crate::stage::{Outcome, Stage};

impl<T: Clone + Send + 'static> Stage<T> {
    fn derive<U: Clone + Send + 'static>(&self) -> Stage<U> {
        let target = Stage::pending(self.caller().clone());
        target.bind(self);
        target
    }

    /// Maps the completed value through `f`.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use stagecraft::{DirectCaller, Stage};
    ///
    /// let caller = Arc::new(DirectCaller::default());
    /// let doubled = Stage::completed(caller, 21).then_apply(|v| v * 2);
    /// assert_eq!(doubled.join_now().unwrap(), 42);
    /// ```
    pub fn then_apply<U, F>(&self, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let target = self.derive::<U>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Completed(v) => match guard(move || f(v)) {
                Ok(u) => {
                    out.complete(u);
                }
                Err(cause) => {
                    out.fail(cause);
                }
            },
            Outcome::Failed(c) => {
                out.fail(c);
            }
            Outcome::Cancelled => {
                out.cancel();
            }
        });
        target
    }

    /// Maps the completed value through a fallible `f`; an `Err` fails the result.
    pub fn then_try_apply<U, E, F>(&self, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        E: Into<Cause>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        let target = self.derive::<U>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Completed(v) => match guard(move || f(v)) {
                Ok(Ok(u)) => {
                    out.complete(u);
                }
                Ok(Err(e)) => {
                    out.fail(e.into());
                }
                Err(cause) => {
                    out.fail(cause);
                }
            },
            Outcome::Failed(c) => {
                out.fail(c);
            }
            Outcome::Cancelled => {
                out.cancel();
            }
        });
        target
    }

    /// Chains another stage produced from the completed value.
    ///
    /// The result follows the produced stage; cancelling the result cancels
    /// the produced stage as well as this one.
    pub fn then_compose<U, F>(&self, f: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Stage<U> + Send + 'static,
    {
        let target = self.derive::<U>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Completed(v) => adopt(&out, guard(move || f(v))),
            Outcome::Failed(c) => {
                out.fail(c);
            }
            Outcome::Cancelled => {
                out.cancel();
            }
        });
        target
    }

    /// Recovers from a failure by mapping the cause to a value.
    pub fn then_catch_failed<F>(&self, f: F) -> Stage<T>
    where
        F: FnOnce(Cause) -> T + Send + 'static,
    {
        let target = self.derive::<T>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Failed(c) => match guard(move || f(c)) {
                Ok(v) => {
                    out.complete(v);
                }
                Err(cause) => {
                    out.fail(cause);
                }
            },
            other => {
                out.finish(other);
            }
        });
        target
    }

    /// Recovers from a failure with another stage.
    pub fn then_compose_failed<F>(&self, f: F) -> Stage<T>
    where
        F: FnOnce(Cause) -> Stage<T> + Send + 'static,
    {
        let target = self.derive::<T>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Failed(c) => adopt(&out, guard(move || f(c))),
            other => {
                out.finish(other);
            }
        });
        target
    }

    /// Recovers from cancellation by producing a value.
    pub fn then_catch_cancelled<F>(&self, f: F) -> Stage<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let target = self.derive::<T>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Cancelled => match guard(f) {
                Ok(v) => {
                    out.complete(v);
                }
                Err(cause) => {
                    out.fail(cause);
                }
            },
            other => {
                out.finish(other);
            }
        });
        target
    }

    /// Recovers from cancellation with another stage.
    pub fn then_compose_cancelled<F>(&self, f: F) -> Stage<T>
    where
        F: FnOnce() -> Stage<T> + Send + 'static,
    {
        let target = self.derive::<T>();
        let out = target.clone();
        self.when_done(move |outcome| match outcome {
            Outcome::Cancelled => adopt(&out, guard(f)),
            other => {
                out.finish(other);
            }
        });
        target
    }
}

/// Makes `target` follow `next`, or fail if producing `next` panicked.
fn adopt<U: Clone + Send + 'static>(target: &Stage<U>, next: Result<Stage<U>, Cause>) {
    match next {
        Ok(next) => {
            target.bind(&next);
            next.forward_to(target);
        }
        Err(cause) => {
            target.fail(cause);
        }
    }
}
