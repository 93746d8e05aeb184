//! # Outcome of a successful retry run.

use std::time::Duration;

use crate::error::Cause;

/// One failed attempt, recorded for diagnostics.
#[derive(Clone, Debug)]
pub struct RetryAttempt {
    /// Time since the run started when the failure was observed.
    pub offset: Duration,
    /// Why the attempt failed.
    pub cause: Cause,
}

/// Value of the first successful attempt plus every failure before it.
#[derive(Clone, Debug)]
pub struct RetryResult<T> {
    /// The successful value.
    pub value: T,
    /// Failed attempts, oldest first.
    pub errors: Vec<RetryAttempt>,
}

impl<T> RetryResult<T> {
    /// Number of attempts made, the successful one included.
    pub fn attempts(&self) -> usize {
        self.errors.len() + 1
    }

    /// Discards the history.
    pub fn into_value(self) -> T {
        self.value
    }
}
