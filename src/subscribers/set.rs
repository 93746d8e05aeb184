//! # Event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`] — delivers each event to every subscriber in
//! registration order, on the calling thread.
//!
//! ## Panic handling
//! Each delivery is wrapped in `catch_unwind`:
//! - the panic is logged through `tracing` (never re-published, to avoid loops)
//! - delivery continues with the next subscriber
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if a subscriber uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::{panic::AssertUnwindSafe, sync::Arc};

use crate::error::Cause;
use crate::events::Event;
use crate::subscribers::{LogWriter, Subscribe};

/// Fan-out coordinator for diagnostic subscribers.
#[derive(Clone)]
pub struct SubscriberSet {
    subscribers: Arc<[Arc<dyn Subscribe>]>,
}

impl SubscriberSet {
    /// Creates a set from the given subscribers.
    #[must_use]
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        Self {
            subscribers: Arc::from(subscribers),
        }
    }

    /// A set that drops every event.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` when there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers `event` to all subscribers.
    pub fn emit(&self, event: &Event) {
        for sub in self.subscribers.iter() {
            let res = std::panic::catch_unwind(AssertUnwindSafe(|| sub.on_event(event)));
            if let Err(payload) = res {
                let cause = Cause::from_panic(payload);
                tracing::error!(
                    subscriber = sub.name(),
                    event = event.kind.as_label(),
                    error = %cause,
                    "subscriber panicked"
                );
            }
        }
    }
}

impl Default for SubscriberSet {
    /// A set holding a single [`LogWriter`].
    fn default() -> Self {
        Self::new(vec![Arc::new(LogWriter::new())])
    }
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.subscribers.iter().map(|s| s.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Subscribe for Counter {
        fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicky;

    impl Subscribe for Panicky {
        fn on_event(&self, _event: &Event) {
            panic!("subscriber failure");
        }

        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[test]
    fn test_panicking_subscriber_does_not_starve_others() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let set = SubscriberSet::new(vec![Arc::new(Panicky), counter.clone()]);

        set.emit(&Event::now(EventKind::InternalError));
        set.emit(&Event::now(EventKind::ReferenceLeaked));

        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_set_logs() {
        let set = SubscriberSet::default();
        assert_eq!(set.len(), 1);
        set.emit(&Event::internal_error("test", Cause::msg("boom")));
    }
}
