//! # Terminal outcome of a stage.

use crate::error::{Cause, JoinError};

/// The decided outcome of a stage.
#[derive(Clone, Debug)]
pub enum Outcome<T> {
    /// Finished with a value.
    Completed(T),
    /// Finished with a failure.
    Failed(Cause),
    /// Cancelled before a value or failure was decided.
    Cancelled,
}

impl<T> Outcome<T> {
    /// Returns `true` for [`Outcome::Completed`].
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// Returns `true` for [`Outcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Returns `true` for [`Outcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The value, if completed.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Completed(v) => Some(v),
            _ => None,
        }
    }

    /// The cause, if failed.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Outcome::Failed(c) => Some(c),
            _ => None,
        }
    }

    /// Maps the completed value, keeping failures and cancellation.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(v) => Outcome::Completed(f(v)),
            Outcome::Failed(c) => Outcome::Failed(c),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Converts into the result `join` returns.
    pub fn into_result(self) -> Result<T, JoinError> {
        match self {
            Outcome::Completed(v) => Ok(v),
            Outcome::Failed(c) => Err(JoinError::Failed(c)),
            Outcome::Cancelled => Err(JoinError::Cancelled),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Cancelled => "cancelled",
        }
    }
}
