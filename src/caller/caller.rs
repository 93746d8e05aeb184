//! # The caller contract.

use std::{backtrace::Backtrace, sync::Arc};

use crate::error::Cause;
use crate::events::Event;
use crate::runtime::Work;

/// Decides how and where a unit of user work runs.
///
/// ### Implementation requirements
/// - `execute` must never let a panic from `work` escape.
/// - `execute` must not hold any lock while running `work`.
/// - Panics are reported through [`internal_error`](Caller::internal_error).
pub trait Caller: Send + Sync + 'static {
    /// Runs `work` according to this caller's policy.
    fn execute(&self, work: Work);

    /// Returns `true` if this caller always hands work off to another thread.
    fn is_threaded(&self) -> bool;

    /// Delivers a diagnostic event to the configured subscribers.
    fn publish(&self, event: Event);

    /// Reports a failure that no stage can receive.
    fn internal_error(&self, context: &str, cause: Cause) {
        self.publish(Event::internal_error(context, cause));
    }

    /// Reports a borrowed reference dropped without release.
    fn reference_leaked(&self, reference: &str, stack: Option<Arc<Backtrace>>) {
        self.publish(Event::reference_leaked(reference, stack));
    }
}
