//! # Awaiting a stage from async code.
//!
//! `Stage<T>` implements [`IntoFuture`]: awaiting registers a one-shot
//! listener and resolves with the same result [`Stage::join`] would return,
//! without blocking the runtime thread.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::error::JoinError;
use crate::stage::{Outcome, Stage};

/// Future returned by awaiting a [`Stage`].
///
/// Dropping the future does not cancel the stage.
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct StageFuture<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T: Clone + Send + 'static> IntoFuture for Stage<T> {
    type Output = Result<T, JoinError>;
    type IntoFuture = StageFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, rx) = oneshot::channel();
        self.when_done(move |outcome| {
            let _ = tx.send(outcome);
        });
        StageFuture { rx }
    }
}

impl<T> Future for StageFuture<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.into_result()),
            // The listener was dropped unrun (its executor went away).
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(JoinError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
