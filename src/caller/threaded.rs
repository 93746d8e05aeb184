//! # Executor-backed caller.

use std::sync::Arc;

use crate::caller::{Caller, guard};
use crate::events::Event;
use crate::runtime::{Executor, Work};
use crate::subscribers::SubscriberSet;

/// Submits every unit of work to an [`Executor`].
///
/// Sibling listeners of one stage may run concurrently on different threads.
#[derive(Clone)]
pub struct ThreadedCaller {
    executor: Arc<dyn Executor>,
    subscribers: SubscriberSet,
}

impl ThreadedCaller {
    /// Creates a caller handing work to `executor`.
    pub fn new(executor: Arc<dyn Executor>, subscribers: SubscriberSet) -> Self {
        Self {
            executor,
            subscribers,
        }
    }
}

impl Caller for ThreadedCaller {
    fn execute(&self, work: Work) {
        let subscribers = self.subscribers.clone();
        self.executor.execute(Box::new(move || {
            if let Err(cause) = guard(work) {
                subscribers.emit(&Event::internal_error("threaded caller", cause));
            }
        }));
    }

    fn is_threaded(&self) -> bool {
        true
    }

    fn publish(&self, event: Event) {
        self.subscribers.emit(&event);
    }
}

impl std::fmt::Debug for ThreadedCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedCaller")
            .field("subscribers", &self.subscribers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::TokioExecutor;
    use std::sync::mpsc;
    use std::time::Duration;

    fn explode() {
        panic!("worker");
    }

    #[test]
    fn test_hands_off_to_executor() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let caller = ThreadedCaller::new(
            Arc::new(TokioExecutor::new(rt.handle().clone())),
            SubscriberSet::empty(),
        );
        assert!(caller.is_threaded());

        let (tx, rx) = mpsc::channel();
        let here = std::thread::current().id();
        caller.execute(Box::new(move || tx.send(std::thread::current().id()).unwrap()));
        let there = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_panic_stays_on_worker() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let caller = ThreadedCaller::new(
            Arc::new(TokioExecutor::new(rt.handle().clone())),
            SubscriberSet::empty(),
        );
        caller.execute(Box::new(explode));

        let (tx, rx) = mpsc::channel();
        caller.execute(Box::new(move || tx.send(()).unwrap()));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }
}
