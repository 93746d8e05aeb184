//! # Managed resource whose value can be replaced while started.
//!
//! ```text
//! reload(start_first = true)            reload(start_first = false)
//!   setup ─► new value                    take old lease (borrows now invalid)
//!   swap current under lock               retire old: wait leases, teardown
//!   retire old: wait leases, teardown     setup ─► new value
//!   done                                  install under lock ─► done
//! ```
//!
//! Borrowers holding the old value keep using it until they release; every
//! borrow taken after the swap sees the new value. With `start_first`, a
//! started resource always has a value to lend.

use std::fmt;
use std::sync::Arc;

use crate::caller::Caller;
use crate::error::ManagedError;
use crate::managed::lease::Lease;
use crate::managed::managed::Shared;
use crate::managed::{Borrowed, Managed, ManagedState};
use crate::stage::{Outcome, Stage};

/// A [`Managed`] resource that additionally supports [`reload`](ReloadableManaged::reload).
pub struct ReloadableManaged<T> {
    managed: Managed<T>,
}

impl<T> Clone for ReloadableManaged<T> {
    fn clone(&self) -> Self {
        Self {
            managed: self.managed.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReloadableManaged<T> {
    /// Creates an unstarted reloadable resource; see [`Managed::new`].
    pub fn new<S, D>(caller: Arc<dyn Caller>, setup: S, teardown: D) -> Self
    where
        S: Fn() -> Stage<T> + Send + Sync + 'static,
        D: Fn(T) -> Stage<()> + Send + Sync + 'static,
    {
        Self {
            managed: Managed::new(caller, setup, teardown),
        }
    }

    /// See [`Managed::with_capture_stack`].
    #[must_use]
    pub fn with_capture_stack(self, capture: bool) -> Self {
        Self {
            managed: self.managed.with_capture_stack(capture),
        }
    }

    /// See [`Managed::state`].
    pub fn state(&self) -> ManagedState {
        self.managed.state()
    }

    /// See [`Managed::start`].
    pub fn start(&self) -> Stage<()> {
        self.managed.start()
    }

    /// See [`Managed::stop`].
    pub fn stop(&self) -> Stage<()> {
        self.managed.stop()
    }

    /// See [`Managed::borrow`].
    pub fn borrow(&self) -> Borrowed<T> {
        self.managed.borrow()
    }

    /// See [`Managed::doto`].
    pub fn doto<U, F>(&self, action: F) -> Stage<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(&T) -> Stage<U>,
    {
        self.managed.doto(action)
    }

    /// Replaces the value with a freshly set-up one.
    ///
    /// The returned stage completes once the new value is installed and the
    /// old one torn down. Fails with [`ManagedError::NotStarted`] unless the
    /// resource is started, and with [`ManagedError::Stopped`] if it is
    /// stopped before the new value could be installed (the new value is
    /// then torn down).
    pub fn reload(&self, start_first: bool) -> Stage<()> {
        let shared = &self.managed.shared;
        let caller = shared.caller().clone();
        if shared.lock().state != ManagedState::Started {
            return Stage::failed(caller, ManagedError::NotStarted);
        }

        let done = Stage::pending(caller);
        if start_first {
            start_then_retire(shared, &done);
        } else {
            retire_then_start(shared, &done);
        }
        done
    }
}

fn start_then_retire<T: Clone + Send + Sync + 'static>(shared: &Arc<Shared<T>>, done: &Stage<()>) {
    let setup = match shared.run_setup() {
        Ok(stage) => stage,
        Err(cause) => {
            done.fail(cause);
            return;
        }
    };

    let shared = Arc::clone(shared);
    let done = done.clone();
    setup.when_done(move |outcome| {
        let value = match outcome {
            Outcome::Completed(v) => v,
            other => {
                done.finish(other.map(|_| ()));
                return;
            }
        };

        let swapped = {
            let mut lc = shared.lock();
            if lc.state == ManagedState::Started {
                let next = Lease::new(shared.caller().clone(), value);
                let old = lc.current.replace(next);
                Ok(old.map(|old| (old, shared.begin_retire(&mut lc))))
            } else {
                Err(value)
            }
        };

        match swapped {
            Ok(Some((old, retired))) => {
                shared.retire(old, &retired);
                retired.forward_to(&done);
            }
            Ok(None) => {
                done.complete(());
            }
            Err(value) => {
                shared.discard(value);
                done.fail(ManagedError::Stopped);
            }
        }
    });
}

fn retire_then_start<T: Clone + Send + Sync + 'static>(shared: &Arc<Shared<T>>, done: &Stage<()>) {
    let old = {
        let mut lc = shared.lock();
        lc.current
            .take()
            .map(|old| (old, shared.begin_retire(&mut lc)))
    };
    let retired = match old {
        Some((old, done)) => {
            shared.retire(old, &done);
            done
        }
        None => Stage::completed(shared.caller().clone(), ()),
    };

    let shared = Arc::clone(shared);
    let done = done.clone();
    retired.when_done(move |outcome| {
        if let Outcome::Failed(cause) = outcome {
            shared.caller().internal_error("managed reload teardown", cause);
        }
        let setup = match shared.run_setup() {
            Ok(stage) => stage,
            Err(cause) => {
                done.fail(cause);
                return;
            }
        };

        setup.when_done(move |outcome| {
            let value = match outcome {
                Outcome::Completed(v) => v,
                other => {
                    done.finish(other.map(|_| ()));
                    return;
                }
            };

            let rejected = {
                let mut lc = shared.lock();
                if lc.state == ManagedState::Started && lc.current.is_none() {
                    lc.current = Some(Lease::new(shared.caller().clone(), value));
                    None
                } else {
                    Some(value)
                }
            };

            match rejected {
                None => {
                    done.complete(());
                }
                Some(value) => {
                    shared.discard(value);
                    done.fail(ManagedError::Stopped);
                }
            }
        });
    });
}

impl<T> fmt::Debug for ReloadableManaged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReloadableManaged").field(&self.managed).finish()
    }
}
