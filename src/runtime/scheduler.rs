//! # Delayed execution.
//!
//! A [`Scheduler`] runs work after a delay and returns a [`Scheduled`] handle
//! that can cancel it before it fires. The retry runner keeps this handle so a
//! target finished from outside never gets a late attempt.
//!
//! [`TokioScheduler`] races the tokio timer against a [`CancellationToken`]:
//! ```text
//! spawn ─► select! {
//!            sleep(delay)        ─► spawn_blocking(work)
//!            token.cancelled()   ─► drop work
//!          }
//! ```

use std::time::Duration;

use tokio::{runtime::Handle, select, time};
use tokio_util::sync::CancellationToken;

use crate::runtime::Work;

/// Handle to a pending scheduled run.
#[derive(Clone, Debug, Default)]
pub struct Scheduled {
    token: CancellationToken,
}

impl Scheduled {
    /// Creates a handle around a fresh cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle around an existing token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Cancels the scheduled run (no-op if it already fired).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The underlying token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Runs work after a delay.
pub trait Scheduler: Send + Sync + 'static {
    /// Schedules `work` to run once `delay` elapsed.
    fn schedule(&self, delay: Duration, work: Work) -> Scheduled;
}

/// Scheduler backed by the tokio timer.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler using the runtime behind `handle` (its time driver must be enabled).
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the runtime the caller is running in.
    ///
    /// Returns `None` outside of a tokio runtime.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, work: Work) -> Scheduled {
        let scheduled = Scheduled::new();
        let token = scheduled.token.clone();

        self.handle.spawn(async move {
            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {
                    if !token.is_cancelled() {
                        drop(tokio::task::spawn_blocking(work));
                    }
                }
                _ = token.cancelled() => {}
            }
        });
        scheduled
    }
}
