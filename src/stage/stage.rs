//! # Stage: a write-once outcome cell with listeners.
//!
//! A [`Stage`] starts `Pending` and moves to exactly one terminal outcome:
//! `Completed(value)`, `Failed(cause)` or `Cancelled`. The first of
//! [`complete`](Stage::complete) / [`fail`](Stage::fail) / [`cancel`](Stage::cancel)
//! wins and returns `true`; every later call returns `false`.
//!
//! ## Listener protocol
//! ```text
//! register(listener)                    finish(outcome)
//!   lock                                  lock
//!   ├─ Pending → push, unlock             ├─ Done    → unlock, return false
//!   └─ Done    → clone outcome, unlock    └─ Pending → take listeners,
//!               └─► caller.execute           store Done(outcome), unlock
//!                                         notify joiners
//!                                         for each listener ─► caller.execute
//! ```
//!
//! ## Rules
//! - The lock only guards the state cell; user code never runs under it.
//! - Every listener runs **exactly once**, whether registered before or after
//!   the outcome was decided.
//! - Already-terminal stages are built directly in the `Done` state and never
//!   allocate a listener list.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::caller::Caller;
use crate::error::{Cause, JoinError};
use crate::stage::Outcome;
use crate::stage::listener::{Cancel, Listener};

enum State<T> {
    Pending(Vec<Listener<T>>),
    Done(Outcome<T>),
}

pub(crate) struct Inner<T> {
    caller: Arc<dyn Caller>,
    state: Mutex<State<T>>,
    done: Condvar,
}

/// Handle to the outcome of an asynchronous computation.
///
/// Cloning a stage is cheap; all clones observe and drive the same cell.
pub struct Stage<T> {
    inner: Arc<Inner<T>>,
}

/// Non-owning handle to a stage, used where holding the stage would form a cycle.
pub(crate) struct WeakStage<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Clone for WeakStage<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> WeakStage<T> {
    pub(crate) fn upgrade(&self) -> Option<Stage<T>> {
        self.inner.upgrade().map(|inner| Stage { inner })
    }
}

impl<T: Clone + Send + 'static> Cancel for WeakStage<T> {
    fn cancel(&self) -> bool {
        self.upgrade().is_some_and(|s| s.cancel())
    }
}

impl<T: Clone + Send + 'static> Stage<T> {
    fn with_state(caller: Arc<dyn Caller>, state: State<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                caller,
                state: Mutex::new(state),
                done: Condvar::new(),
            }),
        }
    }

    /// Creates a pending stage whose listeners run through `caller`.
    pub fn pending(caller: Arc<dyn Caller>) -> Self {
        Self::with_state(caller, State::Pending(Vec::new()))
    }

    /// Creates a stage that is already completed with `value`.
    pub fn completed(caller: Arc<dyn Caller>, value: T) -> Self {
        Self::with_state(caller, State::Done(Outcome::Completed(value)))
    }

    /// Creates a stage that has already failed with `cause`.
    pub fn failed(caller: Arc<dyn Caller>, cause: impl Into<Cause>) -> Self {
        Self::with_state(caller, State::Done(Outcome::Failed(cause.into())))
    }

    /// Creates a stage that is already cancelled.
    pub fn cancelled(caller: Arc<dyn Caller>) -> Self {
        Self::with_state(caller, State::Done(Outcome::Cancelled))
    }

    /// Creates a stage that already holds `outcome`.
    pub fn from_outcome(caller: Arc<dyn Caller>, outcome: Outcome<T>) -> Self {
        Self::with_state(caller, State::Done(outcome))
    }

    /// The caller running this stage's listeners.
    pub fn caller(&self) -> &Arc<dyn Caller> {
        &self.inner.caller
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if both handles refer to the same stage.
    pub fn ptr_eq(&self, other: &Stage<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakStage<T> {
        WeakStage {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Completes the stage with `value`.
    ///
    /// Returns `true` if this call decided the outcome.
    pub fn complete(&self, value: T) -> bool {
        self.finish(Outcome::Completed(value))
    }

    /// Fails the stage with `cause`.
    ///
    /// Returns `true` if this call decided the outcome.
    pub fn fail(&self, cause: impl Into<Cause>) -> bool {
        self.finish(Outcome::Failed(cause.into()))
    }

    /// Cancels the stage.
    ///
    /// Returns `true` if this call decided the outcome.
    pub fn cancel(&self) -> bool {
        self.finish(Outcome::Cancelled)
    }

    /// Decides the outcome if still pending and dispatches the drained listeners.
    pub(crate) fn finish(&self, outcome: Outcome<T>) -> bool {
        let listeners = {
            let mut state = self.lock();
            let State::Pending(listeners) = &mut *state else {
                return false;
            };
            let listeners = std::mem::take(listeners);
            *state = State::Done(outcome.clone());
            listeners
        };
        self.inner.done.notify_all();

        for listener in listeners {
            self.dispatch(listener, &outcome);
        }
        true
    }

    fn dispatch(&self, listener: Listener<T>, outcome: &Outcome<T>) {
        if let Some(work) = listener.into_work(outcome) {
            self.inner.caller.execute(work);
        }
    }

    fn register(&self, listener: Listener<T>) -> &Self {
        let outcome = {
            let mut state = self.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(listener);
                    return self;
                }
                State::Done(outcome) => outcome.clone(),
            }
        };
        self.dispatch(listener, &outcome);
        self
    }

    /// Runs `f` with the outcome once the stage is terminal.
    pub fn when_done<F>(&self, f: F) -> &Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.register(Listener::Done(Box::new(f)))
    }

    /// Runs `f` once the stage is terminal, whatever the outcome.
    pub fn when_finished<F>(&self, f: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Listener::Finished(Box::new(f)))
    }

    /// Runs `f` with the value if the stage completes.
    pub fn when_completed<F>(&self, f: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.register(Listener::Completed(Box::new(f)))
    }

    /// Runs `f` with the cause if the stage fails.
    pub fn when_failed<F>(&self, f: F) -> &Self
    where
        F: FnOnce(Cause) + Send + 'static,
    {
        self.register(Listener::Failed(Box::new(f)))
    }

    /// Runs `f` if the stage is cancelled.
    pub fn when_cancelled<F>(&self, f: F) -> &Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(Listener::Cancelled(Box::new(f)))
    }

    /// Cancels `other` when this stage is cancelled.
    ///
    /// `other` is held weakly: binding never keeps it alive. Completing or
    /// failing this stage leaves `other` alone, and nothing flows back from
    /// `other` to this stage.
    pub fn bind<U: Clone + Send + 'static>(&self, other: &Stage<U>) -> &Self {
        self.register(Listener::Bind(Box::new(other.downgrade())))
    }

    /// Forwards this stage's outcome into `target`.
    pub(crate) fn forward_to(&self, target: &Stage<T>) {
        let target = target.clone();
        self.when_done(move |outcome| {
            target.finish(outcome);
        });
    }

    /// Returns `true` once the outcome is decided.
    pub fn is_done(&self) -> bool {
        matches!(&*self.lock(), State::Done(_))
    }

    /// Returns `true` if the stage completed with a value.
    pub fn is_completed(&self) -> bool {
        matches!(&*self.lock(), State::Done(Outcome::Completed(_)))
    }

    /// Returns `true` if the stage failed.
    pub fn is_failed(&self) -> bool {
        matches!(&*self.lock(), State::Done(Outcome::Failed(_)))
    }

    /// Returns `true` if the stage was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.lock(), State::Done(Outcome::Cancelled))
    }

    /// The failure cause, if the stage failed.
    pub fn cause(&self) -> Option<Cause> {
        match &*self.lock() {
            State::Done(Outcome::Failed(c)) => Some(c.clone()),
            _ => None,
        }
    }

    /// The decided outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        match &*self.lock() {
            State::Done(o) => Some(o.clone()),
            State::Pending(_) => None,
        }
    }

    /// Blocks the current thread until the stage is terminal.
    pub fn join(&self) -> Result<T, JoinError> {
        let mut state = self.lock();
        loop {
            if let State::Done(outcome) = &*state {
                return outcome.clone().into_result();
            }
            state = self
                .inner
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the stage is terminal or `timeout` elapses.
    ///
    /// On timeout returns [`JoinError::Timeout`]; the stage stays pending.
    pub fn join_timeout(&self, timeout: Duration) -> Result<T, JoinError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let State::Done(outcome) = &*state {
                return outcome.clone().into_result();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(JoinError::Timeout { timeout });
            }
            let (next, _) = self
                .inner
                .done
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    /// Returns the outcome without blocking; [`JoinError::Pending`] if not yet decided.
    pub fn join_now(&self) -> Result<T, JoinError> {
        match &*self.lock() {
            State::Done(outcome) => outcome.clone().into_result(),
            State::Pending(_) => Err(JoinError::Pending),
        }
    }
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let label = match &*state {
            State::Pending(listeners) => {
                return f
                    .debug_struct("Stage")
                    .field("state", &"pending")
                    .field("listeners", &listeners.len())
                    .finish();
            }
            State::Done(outcome) => outcome.as_label(),
        };
        f.debug_struct("Stage").field("state", &label).finish()
    }
}
