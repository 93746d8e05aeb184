//! Error types used by stages, collectors, managed resources and retries.
//!
//! Failures that travel *through* a [`Stage`](crate::Stage) are carried by [`Cause`],
//! a cheaply cloneable handle to any `std::error::Error` plus an ordered list of
//! suppressed (secondary) causes. Errors raised *by* the library are typed enums:
//!
//! - [`JoinError`] — waiting on a stage did not yield a value.
//! - [`CollectError`] — carrier for an aggregate of failed children.
//! - [`ManagedError`] — lifecycle violations of a managed resource.
//! - [`RetryError`] — the retry runner could not continue.
//! - [`BuildError`] — inconsistent framework configuration.
//!
//! All enums provide `as_label` (stable snake_case) for logs/metrics.

use std::{any::Any, error::Error as StdError, fmt, sync::Arc, time::Duration};

use thiserror::Error;

/// Shared failure cause of a stage.
///
/// Cloning is cheap: the underlying error is reference-counted and every clone
/// observes the same error instance (see [`Cause::same_error`]).
#[derive(Clone)]
pub struct Cause {
    error: Arc<dyn StdError + Send + Sync + 'static>,
    suppressed: Arc<[Cause]>,
}

impl Cause {
    /// Wraps an arbitrary error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            error: Arc::new(error),
            suppressed: Arc::from(Vec::new()),
        }
    }

    /// Builds a cause from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Converts a panic payload (from `catch_unwind`) into a cause.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::new(PanicError { message })
    }

    /// Returns a cause sharing the same error, with `causes` appended to the suppressed list.
    #[must_use]
    pub fn with_suppressed(self, causes: Vec<Cause>) -> Self {
        if causes.is_empty() {
            return self;
        }
        let mut all: Vec<Cause> = self.suppressed.iter().cloned().collect();
        all.extend(causes);
        Self {
            error: self.error,
            suppressed: Arc::from(all),
        }
    }

    /// Secondary causes, in the order they were attached.
    pub fn suppressed(&self) -> &[Cause] {
        &self.suppressed
    }

    /// The underlying error.
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.error
    }

    /// Attempts to view the underlying error as `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }

    /// Returns `true` when both causes wrap the very same error instance.
    pub fn same_error(&self, other: &Cause) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.error), Arc::as_ptr(&other.error))
    }

    /// Returns `true` if the underlying error is a caught panic.
    pub fn is_panic(&self) -> bool {
        self.downcast_ref::<PanicError>().is_some()
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.error, f)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cause")
            .field("error", &self.error)
            .field("suppressed", &self.suppressed.len())
            .finish()
    }
}

impl StdError for Cause {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error.source()
    }
}

impl From<&str> for Cause {
    fn from(value: &str) -> Self {
        Cause::msg(value)
    }
}

impl From<String> for Cause {
    fn from(value: String) -> Self {
        Cause::msg(value)
    }
}

impl From<Box<dyn StdError + Send + Sync + 'static>> for Cause {
    fn from(value: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self {
            error: Arc::from(value),
            suppressed: Arc::from(Vec::new()),
        }
    }
}

impl From<std::io::Error> for Cause {
    fn from(value: std::io::Error) -> Self {
        Cause::new(value)
    }
}

/// Plain-text error behind [`Cause::msg`].
#[derive(Error, Debug)]
#[error("{0}")]
struct Message(String);

/// A user callback panicked; the panic was caught at the caller boundary.
#[derive(Error, Debug, Clone)]
#[error("panicked: {message}")]
pub struct PanicError {
    /// Panic payload rendered as text.
    pub message: String,
}

/// # Errors returned when waiting on a stage.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum JoinError {
    /// The stage failed; the cause is attached.
    #[error("stage failed: {0}")]
    Failed(Cause),

    /// The stage was cancelled.
    #[error("stage cancelled")]
    Cancelled,

    /// The stage did not finish within the given timeout. The stage itself is untouched.
    #[error("timed out after {timeout:?} waiting for stage")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// `join_now` was called on a stage that is still pending.
    #[error("stage is still pending")]
    Pending,
}

impl JoinError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagecraft::JoinError;
    ///
    /// assert_eq!(JoinError::Cancelled.as_label(), "join_cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JoinError::Failed(_) => "join_failed",
            JoinError::Cancelled => "join_cancelled",
            JoinError::Timeout { .. } => "join_timeout",
            JoinError::Pending => "join_pending",
        }
    }

    /// Returns the failure cause, if the stage failed.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            JoinError::Failed(cause) => Some(cause),
            _ => None,
        }
    }
}

/// # Aggregate failure of a collector.
///
/// Used as the carrier error: every failed child is attached to the carrying
/// [`Cause`] as a suppressed cause, in arrival order.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum CollectError {
    /// Some children failed.
    #[error("{failed} of {total} collected stages failed")]
    Failed {
        /// Number of failed children.
        failed: usize,
        /// Number of children in the collection.
        total: usize,
    },
}

impl CollectError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CollectError::Failed { .. } => "collect_failed",
        }
    }
}

/// # Errors produced by managed resources.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagedError {
    /// No valid reference could be borrowed (not started, or stopping).
    #[error("cannot borrow reference")]
    BorrowFailed,

    /// The operation requires a started resource.
    #[error("managed resource is not started")]
    NotStarted,

    /// The resource was stopped while the operation was in progress.
    #[error("managed resource was stopped")]
    Stopped,
}

impl ManagedError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagedError::BorrowFailed => "managed_borrow_failed",
            ManagedError::NotStarted => "managed_not_started",
            ManagedError::Stopped => "managed_stopped",
        }
    }
}

/// # Errors produced by the retry runner itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// The policy asked for a delayed retry but no scheduler is configured.
    #[error("retry needs a {backoff:?} backoff but no scheduler is configured")]
    NoScheduler {
        /// The requested backoff.
        backoff: Duration,
    },
}

impl RetryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RetryError::NoScheduler { .. } => "retry_no_scheduler",
        }
    }
}

/// # Errors produced while building a [`Framework`](crate::Framework).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The configured caller mode hands work off to an executor, but none was given.
    #[error("{mode} caller requires an executor")]
    MissingExecutor {
        /// The mode that needs an executor (e.g. "threaded").
        mode: &'static str,
    },
}

impl BuildError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagecraft::BuildError;
    ///
    /// let err = BuildError::MissingExecutor { mode: "threaded" };
    /// assert_eq!(err.as_label(), "build_missing_executor");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BuildError::MissingExecutor { .. } => "build_missing_executor",
        }
    }
}

macro_rules! cause_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Cause {
                fn from(value: $ty) -> Self {
                    Cause::new(value)
                }
            }
        )*
    };
}

cause_from!(PanicError, CollectError, ManagedError, RetryError, BuildError);
