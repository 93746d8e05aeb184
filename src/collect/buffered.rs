//! # Buffered collectors: every child value is kept until the reduction.

use std::sync::Arc;

use crate::caller::Caller;
use crate::collect::job::Job;
use crate::stage::Stage;

/// Collects the values of `stages` in input order.
///
/// Resolves immediately to an empty vector for empty input. If any child
/// fails the result fails with a [`CollectError`](crate::CollectError) carrier;
/// otherwise, if any child is cancelled, the result is cancelled.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use stagecraft::{collect, Caller, DirectCaller, Stage};
///
/// let caller: Arc<dyn Caller> = Arc::new(DirectCaller::default());
/// let stages = vec![
///     Stage::completed(caller.clone(), 1),
///     Stage::completed(caller.clone(), 2),
/// ];
/// assert_eq!(collect(caller, stages).join_now().unwrap(), vec![1, 2]);
/// ```
pub fn collect<T, I>(caller: Arc<dyn Caller>, stages: I) -> Stage<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Stage<T>>,
{
    Job::run(
        stages.into_iter().collect(),
        Stage::pending(caller),
        |mut values: Vec<(usize, T)>| {
            values.sort_unstable_by_key(|(index, _)| *index);
            values.into_iter().map(|(_, v)| v).collect()
        },
    )
}

/// Collects the values of `stages` and reduces them with `reducer`.
///
/// `reducer` sees each value exactly once, in the order the children finished.
/// A panic in `reducer` fails the result.
pub fn collect_with<T, U, I, F>(caller: Arc<dyn Caller>, stages: I, reducer: F) -> Stage<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    I: IntoIterator<Item = Stage<T>>,
    F: FnOnce(Vec<T>) -> U + Send + 'static,
{
    Job::run(
        stages.into_iter().collect(),
        Stage::pending(caller),
        move |values: Vec<(usize, T)>| reducer(values.into_iter().map(|(_, v)| v).collect()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::DirectCaller;
    use crate::error::{Cause, CollectError, JoinError};
    use crate::subscribers::SubscriberSet;
    use std::collections::HashSet;
    use std::thread;

    fn caller() -> Arc<dyn Caller> {
        Arc::new(DirectCaller::new(SubscriberSet::empty()))
    }

    fn reducer_panics(_: Vec<u32>) -> u32 {
        panic!("reducer")
    }

    #[test]
    fn test_empty_input_resolves_immediately() {
        let out = collect::<u32, _>(caller(), Vec::new());
        assert_eq!(out.join_now().unwrap(), Vec::<u32>::new());

        let sum = collect_with(caller(), Vec::<Stage<u32>>::new(), |v| v.len());
        assert_eq!(sum.join_now().unwrap(), 0);
    }

    #[test]
    fn test_collect_keeps_input_order() {
        let c = caller();
        let stages: Vec<_> = (0..5).map(|_| Stage::<u32>::pending(c.clone())).collect();
        let out = collect(c, stages.clone());

        for (i, s) in stages.iter().enumerate().rev() {
            assert!(!out.is_done());
            s.complete(i as u32);
        }
        assert_eq!(out.join_now().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_collect_with_sees_every_value_once() {
        let c = caller();
        let stages: Vec<_> = (0..64).map(|_| Stage::<u32>::pending(c.clone())).collect();
        let out = collect_with(c, stages.clone(), |values| {
            values.into_iter().collect::<HashSet<_>>()
        });

        let handles: Vec<_> = stages
            .into_iter()
            .enumerate()
            .map(|(i, s)| thread::spawn(move || s.complete(i as u32)))
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(out.join().unwrap(), (0..64).collect::<HashSet<_>>());
    }

    #[test]
    fn test_failures_are_suppressed_in_arrival_order() {
        let c = caller();
        let stages: Vec<_> = (0..5).map(|_| Stage::<u32>::pending(c.clone())).collect();
        let out = collect(c, stages.clone());

        let second = Cause::msg("second");
        let first = Cause::msg("first");
        stages[0].complete(0);
        stages[4].fail(first.clone());
        stages[1].cancel();
        stages[2].fail(second.clone());
        stages[3].complete(3);

        let cause = out.cause().unwrap();
        assert!(matches!(
            cause.downcast_ref::<CollectError>(),
            Some(CollectError::Failed { failed: 2, total: 5 })
        ));
        assert_eq!(cause.suppressed().len(), 2);
        assert!(cause.suppressed()[0].same_error(&first));
        assert!(cause.suppressed()[1].same_error(&second));
    }

    #[test]
    fn test_cancelled_child_cancels_result() {
        let c = caller();
        let out = collect(
            c.clone(),
            vec![Stage::completed(c.clone(), 1u32), Stage::cancelled(c)],
        );
        assert!(matches!(out.join_now(), Err(JoinError::Cancelled)));
    }

    #[test]
    fn test_reducer_panic_fails_result() {
        let c = caller();
        let out = collect_with(c.clone(), vec![Stage::completed(c, 1u32)], reducer_panics);
        assert!(out.cause().unwrap().is_panic());
    }

    #[test]
    fn test_cancelling_parent_cancels_pending_children() {
        let c = caller();
        let done = Stage::completed(c.clone(), 1u32);
        let pending = Stage::<u32>::pending(c.clone());
        let out = collect(c, vec![done.clone(), pending.clone()]);

        assert!(out.cancel());
        assert!(pending.is_cancelled());
        assert!(done.is_completed());
    }
}
