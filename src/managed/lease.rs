//! # Lease accounting for one underlying value.
//!
//! A lease count starts at 1: the lifecycle's own implicit lease. Each valid
//! borrow adds one; retiring the value drops the implicit lease. The stage
//! returned by [`Lease::drained`] completes when the count reaches zero,
//! after which no further lease can be taken.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::caller::Caller;
use crate::stage::Stage;

pub(crate) struct Lease<T> {
    value: T,
    count: AtomicUsize,
    drained: Stage<()>,
}

impl<T> Lease<T> {
    pub(crate) fn new(caller: Arc<dyn Caller>, value: T) -> Arc<Self> {
        Arc::new(Self {
            value,
            count: AtomicUsize::new(1),
            drained: Stage::pending(caller),
        })
    }

    pub(crate) fn value(&self) -> &T {
        &self.value
    }

    /// Takes one more lease unless the count already reached zero.
    pub(crate) fn retain(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Gives one lease back; the last one completes [`drained`](Lease::drained).
    pub(crate) fn release(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.complete(());
        }
    }

    pub(crate) fn drained(&self) -> &Stage<()> {
        &self.drained
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::DirectCaller;

    #[test]
    fn test_drains_after_last_release() {
        let lease = Lease::new(Arc::new(DirectCaller::default()), "v");
        assert!(lease.retain());
        assert_eq!(lease.count(), 2);

        lease.release();
        assert!(!lease.drained().is_done());
        lease.release();
        assert!(lease.drained().is_completed());

        assert!(!lease.retain());
        assert_eq!(lease.count(), 0);
    }
}
