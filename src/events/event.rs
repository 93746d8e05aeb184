//! # Diagnostic events emitted by callers and the retry runner.
//!
//! The [`EventKind`] enum classifies what happened; the [`Event`] struct carries
//! timestamps and the optional details relevant to that kind (context, error,
//! leaked reference, captured stack, attempt, backoff delay).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Subscribers may be called from many threads at once; use `seq` to restore order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stagecraft::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::RetryScheduled)
//!     .with_context("retry_until_completed")
//!     .with_error("connection refused")
//!     .with_attempt(3)
//!     .with_delay(Duration::from_millis(400));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.attempt, Some(3));
//! assert_eq!(ev.error.as_deref(), Some("connection refused"));
//! ```

use std::backtrace::Backtrace;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::error::Cause;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// User code panicked inside a caller, or a callback failed where no stage
    /// could receive the failure.
    ///
    /// Sets:
    /// - `context`: where it happened
    /// - `error`, `cause`: the failure
    InternalError,

    /// A valid borrowed reference was dropped without being released.
    ///
    /// Sets:
    /// - `reference`: description of the leaked handle
    /// - `stack`: backtrace captured at borrow time (only with `capture_stack`)
    ReferenceLeaked,

    /// The retry runner scheduled another attempt.
    ///
    /// Sets:
    /// - `attempt`: failed attempt number (1-based)
    /// - `delay`: backoff before the next attempt
    /// - `error`: failure of the attempt
    RetryScheduled,

    /// The retry policy refused another attempt; the target failed.
    ///
    /// Sets:
    /// - `attempt`: last attempt number
    /// - `error`: final failure
    RetryExhausted,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::InternalError => "internal_error",
            EventKind::ReferenceLeaked => "reference_leaked",
            EventKind::RetryScheduled => "retry_scheduled",
            EventKind::RetryExhausted => "retry_exhausted",
        }
    }
}

/// Diagnostic event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Where the event originated (operation name).
    pub context: Option<Arc<str>>,
    /// Human-readable error message.
    pub error: Option<Arc<str>>,
    /// The failure itself, when one is available.
    pub cause: Option<Cause>,
    /// Description of a leaked reference.
    pub reference: Option<Arc<str>>,
    /// Backtrace captured when the leaked reference was borrowed.
    pub stack: Option<Arc<Backtrace>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Backoff delay before the next attempt.
    pub delay: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            context: None,
            error: None,
            cause: None,
            reference: None,
            stack: None,
            attempt: None,
            delay: None,
        }
    }

    /// Attaches the originating operation.
    #[inline]
    pub fn with_context(mut self, context: impl Into<Arc<str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attaches an error message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches a cause; also fills `error` with its rendering.
    #[inline]
    pub fn with_cause(mut self, cause: Cause) -> Self {
        self.error = Some(cause.to_string().into());
        self.cause = Some(cause);
        self
    }

    /// Attaches a leaked reference description.
    #[inline]
    pub fn with_reference(mut self, reference: impl Into<Arc<str>>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Attaches a captured backtrace.
    #[inline]
    pub fn with_stack(mut self, stack: Option<Arc<Backtrace>>) -> Self {
        self.stack = stack;
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a backoff delay.
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    /// Creates an internal-error event.
    #[inline]
    pub fn internal_error(context: &str, cause: Cause) -> Self {
        Event::now(EventKind::InternalError)
            .with_context(context)
            .with_cause(cause)
    }

    /// Creates a reference-leaked event.
    #[inline]
    pub fn reference_leaked(reference: &str, stack: Option<Arc<Backtrace>>) -> Self {
        Event::now(EventKind::ReferenceLeaked)
            .with_reference(reference)
            .with_stack(stack)
    }
}
