//! # Collection job: countdown, slots and the single reducer.
//!
//! ```text
//! child i done ──► slot = next_slot.fetch_add(1)
//!                  slots[slot] = (i, outcome)
//!                  remaining.fetch_sub(1) == 1 ?
//!                     └─ yes (exactly one thread) ──► reduce ──► parent
//! ```
//!
//! Slots are claimed in arrival order, so draining them front to back yields
//! outcomes in the order the children finished.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::caller::guard;
use crate::error::{Cause, CollectError};
use crate::stage::{Outcome, Stage, WeakStage};

/// Carrier cause for `failures` out of `total` children, each attached as suppressed.
pub(crate) fn aggregate(failures: Vec<Cause>, total: usize) -> Cause {
    Cause::new(CollectError::Failed {
        failed: failures.len(),
        total,
    })
    .with_suppressed(failures)
}

/// Cancels every still-pending child once `parent` is cancelled.
pub(crate) fn cancel_children_on_cancel<T, U>(parent: &Stage<U>, children: Vec<WeakStage<T>>)
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    if children.is_empty() {
        return;
    }
    parent.when_cancelled(move || {
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }
    });
}

type Slot<T> = Mutex<Option<(usize, Outcome<T>)>>;

/// Buffered collection of `N` children reduced once by `reduce`.
///
/// `reduce` receives `(input index, value)` pairs in arrival order.
pub(crate) struct Job<T, U, F> {
    remaining: AtomicUsize,
    next_slot: AtomicUsize,
    slots: Box<[Slot<T>]>,
    reduce: Mutex<Option<F>>,
    target: Stage<U>,
}

impl<T, U, F> Job<T, U, F>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    F: FnOnce(Vec<(usize, T)>) -> U + Send + 'static,
{
    /// Wires `stages` into `target` and returns it.
    pub(crate) fn run(stages: Vec<Stage<T>>, target: Stage<U>, reduce: F) -> Stage<U> {
        let total = stages.len();
        let job = Arc::new(Self {
            remaining: AtomicUsize::new(total),
            next_slot: AtomicUsize::new(0),
            slots: (0..total).map(|_| Mutex::new(None)).collect(),
            reduce: Mutex::new(Some(reduce)),
            target: target.clone(),
        });

        if total == 0 {
            job.finish();
            return target;
        }

        cancel_children_on_cancel(&target, stages.iter().map(Stage::downgrade).collect());

        for (index, stage) in stages.into_iter().enumerate() {
            let job = Arc::clone(&job);
            stage.when_done(move |outcome| job.record(index, outcome));
        }
        target
    }

    fn record(&self, index: usize, outcome: Outcome<T>) {
        let slot = self.next_slot.fetch_add(1, Ordering::AcqRel);
        *self.slots[slot].lock().unwrap_or_else(PoisonError::into_inner) = Some((index, outcome));

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        let total = self.slots.len();
        let mut failures = Vec::new();
        let mut cancelled = false;
        let mut values = Vec::with_capacity(total);

        for slot in self.slots.iter() {
            let taken = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            match taken {
                Some((index, Outcome::Completed(v))) => values.push((index, v)),
                Some((_, Outcome::Failed(c))) => failures.push(c),
                Some((_, Outcome::Cancelled)) => cancelled = true,
                None => {}
            }
        }

        if !failures.is_empty() {
            self.target.fail(aggregate(failures, total));
            return;
        }
        if cancelled {
            self.target.cancel();
            return;
        }

        let reduce = self
            .reduce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(reduce) = reduce else {
            return;
        };
        match guard(move || reduce(values)) {
            Ok(u) => {
                self.target.complete(u);
            }
            Err(cause) => {
                self.target.fail(cause);
            }
        }
    }
}
