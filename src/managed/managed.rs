//! # Managed resource: start once, borrow many, stop after the last release.
//!
//! ## Lifecycle
//! ```text
//! start():  Initialized ──(first caller runs setup)──► Started
//!           concurrent callers share the same start stage;
//!           setup failure/cancel → back to Initialized (a later start retries)
//!
//! stop():   Started ──► Stopping ─► wait for start ─► take current lease
//!                                   release implicit lease
//!                                   wait for lease count == 0
//!                                   teardown(value)
//!                                   wait for values retired by reload ─► Stopped
//!           memoized: every call returns the same stop stage
//! ```
//!
//! ## Rules
//! - The lifecycle lock only guards state transitions and lease hand-out;
//!   setup and teardown always run outside it.
//! - `borrow` takes a lease under the lifecycle lock, so a value swapped out
//!   by stop or reload never hands out a new lease afterwards.
//! - Every retirement is registered under the same lock that swaps the value
//!   out, so `stop` never misses a value still waiting for its leases.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::caller::{Caller, guard};
use crate::collect::collect_and_discard;
use crate::error::{Cause, ManagedError};
use crate::managed::{Borrowed, ManagedState, lease::Lease};
use crate::stage::{Outcome, Stage};

type Setup<T> = Box<dyn Fn() -> Stage<T> + Send + Sync>;
type Teardown<T> = Box<dyn Fn(T) -> Stage<()> + Send + Sync>;

pub(crate) struct Lifecycle<T> {
    pub(crate) state: ManagedState,
    pub(crate) start: Option<Stage<()>>,
    pub(crate) stop: Option<Stage<()>>,
    pub(crate) current: Option<Arc<Lease<T>>>,
    /// Teardowns of swapped-out values, pending until their leases drain.
    pub(crate) retiring: Vec<Stage<()>>,
}

pub(crate) struct Shared<T> {
    caller: Arc<dyn Caller>,
    setup: Setup<T>,
    teardown: Teardown<T>,
    capture_stack: AtomicBool,
    lifecycle: Mutex<Lifecycle<T>>,
}

/// A reference-counted value with an explicit start/stop lifecycle.
///
/// Cloning is cheap and every clone controls the same resource.
pub struct Managed<T> {
    pub(crate) shared: Arc<Shared<T>>,
}

impl<T> Clone for Managed<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Managed<T> {
    /// Creates an unstarted resource.
    ///
    /// `setup` builds the value on [`start`](Managed::start); `teardown`
    /// disposes of it once stopped and every lease is released.
    pub fn new<S, D>(caller: Arc<dyn Caller>, setup: S, teardown: D) -> Self
    where
        S: Fn() -> Stage<T> + Send + Sync + 'static,
        D: Fn(T) -> Stage<()> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                caller,
                setup: Box::new(setup),
                teardown: Box::new(teardown),
                capture_stack: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle {
                    state: ManagedState::Initialized,
                    start: None,
                    stop: None,
                    current: None,
                    retiring: Vec::new(),
                }),
            }),
        }
    }

    /// Captures a backtrace on every borrow so leak reports can show where
    /// the leaked handle was taken.
    #[must_use]
    pub fn with_capture_stack(self, capture: bool) -> Self {
        self.shared.capture_stack.store(capture, Ordering::Release);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagedState {
        self.shared.lock().state
    }

    /// Starts the resource; only the first call runs `setup`.
    ///
    /// Fails with [`ManagedError::Stopped`] once `stop` was called.
    pub fn start(&self) -> Stage<()> {
        self.shared.start()
    }

    /// Stops the resource, tearing the value down after the last release.
    pub fn stop(&self) -> Stage<()> {
        self.shared.stop()
    }

    /// Takes a lease on the value; the handle is invalid unless started.
    pub fn borrow(&self) -> Borrowed<T> {
        self.shared.borrow()
    }

    /// Borrows the value for the duration of the stage `action` returns.
    ///
    /// The lease is released when that stage finishes, when `action` panics,
    /// or immediately if borrowing fails (the result then fails with
    /// [`ManagedError::BorrowFailed`]).
    pub fn doto<U, F>(&self, action: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> Stage<U>,
    {
        let borrowed = self.borrow();
        let caller = Arc::clone(&self.shared.caller);
        let Some(value) = borrowed.get() else {
            return Stage::failed(caller, ManagedError::BorrowFailed);
        };

        match guard(|| action(value)) {
            Ok(stage) => {
                stage.when_finished(move || borrowed.release());
                stage
            }
            Err(cause) => {
                borrowed.release();
                Stage::failed(caller, cause)
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Lifecycle<T>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn caller(&self) -> &Arc<dyn Caller> {
        &self.caller
    }

    fn start(self: &Arc<Self>) -> Stage<()> {
        let stage = {
            let mut lc = self.lock();
            match lc.state {
                ManagedState::Started => return Stage::completed(self.caller.clone(), ()),
                ManagedState::Stopping | ManagedState::Stopped => {
                    return Stage::failed(self.caller.clone(), ManagedError::Stopped);
                }
                ManagedState::Initialized => {
                    if let Some(start) = &lc.start {
                        return start.clone();
                    }
                    let stage = Stage::pending(self.caller.clone());
                    lc.start = Some(stage.clone());
                    stage
                }
            }
        };

        let this = Arc::clone(self);
        let abandoned = stage.clone();
        stage.when_cancelled(move || this.abandon_start(&abandoned));

        match self.run_setup() {
            Ok(value) => {
                let this = Arc::clone(self);
                let start = stage.clone();
                value.when_done(move |outcome| match outcome {
                    Outcome::Completed(v) => this.install(&start, v),
                    other => {
                        this.abandon_start(&start);
                        start.finish(other.map(|_| ()));
                    }
                });
            }
            Err(cause) => {
                self.abandon_start(&stage);
                stage.fail(cause);
            }
        }
        stage
    }

    pub(crate) fn run_setup(&self) -> Result<Stage<T>, Cause> {
        guard(|| (self.setup)())
    }

    /// Publishes the value produced for `start`, or disposes of it if that
    /// start is no longer current.
    fn install(&self, start: &Stage<()>, value: T) {
        let rejected = {
            let mut lc = self.lock();
            let current = lc.start.as_ref().is_some_and(|s| s.ptr_eq(start));
            let live = matches!(lc.state, ManagedState::Initialized | ManagedState::Stopping);
            if current && live && !start.is_done() {
                if lc.state == ManagedState::Initialized {
                    lc.state = ManagedState::Started;
                }
                lc.current = Some(Lease::new(self.caller.clone(), value));
                None
            } else {
                Some(value)
            }
        };

        match rejected {
            None => {
                start.complete(());
            }
            Some(value) => {
                self.discard(value);
                start.fail(ManagedError::Stopped);
            }
        }
    }

    fn abandon_start(&self, start: &Stage<()>) {
        let mut lc = self.lock();
        if lc.start.as_ref().is_some_and(|s| s.ptr_eq(start)) {
            lc.start = None;
        }
    }

    fn stop(self: &Arc<Self>) -> Stage<()> {
        let (stop, start) = {
            let mut lc = self.lock();
            if let Some(stop) = &lc.stop {
                return stop.clone();
            }
            match lc.start.clone() {
                Some(start) => {
                    let stop = Stage::pending(self.caller.clone());
                    lc.state = ManagedState::Stopping;
                    lc.stop = Some(stop.clone());
                    (stop, start)
                }
                _ => {
                    let stop = Stage::completed(self.caller.clone(), ());
                    lc.state = ManagedState::Stopped;
                    lc.stop = Some(stop.clone());
                    return stop;
                }
            }
        };

        let this = Arc::clone(self);
        let out = stop.clone();
        start.when_finished(move || this.finish_stop(out));
        stop
    }

    /// Retires the current value, then waits for it and for every value an
    /// earlier reload is still retiring. The stop outcome is the current
    /// value's teardown outcome; reload teardowns report through their reload.
    fn finish_stop(self: Arc<Self>, stop: Stage<()>) {
        let (current, others) = {
            let mut lc = self.lock();
            let others = lc.retiring.clone();
            let current = lc
                .current
                .take()
                .map(|lease| (lease, self.begin_retire(&mut lc)));
            (current, others)
        };

        let own = match current {
            Some((lease, done)) => {
                self.retire(lease, &done);
                done
            }
            None => Stage::completed(self.caller.clone(), ()),
        };

        let this = Arc::clone(&self);
        collect_and_discard(self.caller.clone(), others).when_finished(move || {
            own.when_done(move |outcome| {
                this.lock().state = ManagedState::Stopped;
                stop.finish(outcome);
            });
        });
    }

    fn borrow(&self) -> Borrowed<T> {
        let lease = {
            let lc = self.lock();
            if lc.state == ManagedState::Started {
                lc.current.as_ref().filter(|l| l.retain()).cloned()
            } else {
                None
            }
        };
        match lease {
            Some(lease) => Borrowed::valid(
                lease,
                self.caller.clone(),
                self.capture_stack.load(Ordering::Acquire),
            ),
            None => Borrowed::invalid(self.caller.clone()),
        }
    }

    /// Registers a pending retirement; call it under the lock that swaps the
    /// value out, then hand the same stage to [`retire`](Self::retire).
    pub(crate) fn begin_retire(&self, lc: &mut Lifecycle<T>) -> Stage<()> {
        let done = Stage::pending(self.caller.clone());
        lc.retiring.push(done.clone());
        done
    }

    /// Drops the implicit lease of `lease` and tears its value down once
    /// drained, finishing `done`.
    pub(crate) fn retire(self: &Arc<Self>, lease: Arc<Lease<T>>, done: &Stage<()>) {
        let this = Arc::clone(self);
        let finished = done.clone();
        done.when_finished(move || {
            this.lock().retiring.retain(|s| !s.ptr_eq(&finished));
        });

        let this = Arc::clone(self);
        let out = done.clone();
        let drained = Arc::clone(&lease);
        lease.drained().when_finished(move || {
            let value = drained.value().clone();
            match guard(|| (this.teardown)(value)) {
                Ok(stage) => stage.forward_to(&out),
                Err(cause) => {
                    out.fail(cause);
                }
            }
        });
        lease.release();
    }

    /// Tears down a value that was never published.
    pub(crate) fn discard(&self, value: T) {
        let caller = self.caller.clone();
        match guard(|| (self.teardown)(value)) {
            Ok(stage) => {
                stage.when_failed(move |cause| caller.internal_error("managed teardown", cause));
            }
            Err(cause) => self.caller.internal_error("managed teardown", cause),
        }
    }
}

impl<T> fmt::Debug for Managed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .shared
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state;
        f.debug_struct("Managed")
            .field("state", &state.as_label())
            .finish_non_exhaustive()
    }
}
