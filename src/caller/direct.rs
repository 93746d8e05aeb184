//! # Inline caller.

use crate::caller::{Caller, guard};
use crate::events::Event;
use crate::runtime::Work;
use crate::subscribers::SubscriberSet;

/// Runs work inline on the calling thread.
///
/// Panics are caught and reported as internal errors; the caller's state is
/// never affected by them.
#[derive(Clone, Debug, Default)]
pub struct DirectCaller {
    subscribers: SubscriberSet,
}

impl DirectCaller {
    /// Creates a caller reporting to `subscribers`.
    pub fn new(subscribers: SubscriberSet) -> Self {
        Self { subscribers }
    }
}

impl Caller for DirectCaller {
    fn execute(&self, work: Work) {
        if let Err(cause) = guard(work) {
            self.internal_error("direct caller", cause);
        }
    }

    fn is_threaded(&self) -> bool {
        false
    }

    fn publish(&self, event: Event) {
        self.subscribers.emit(&event);
    }
}
