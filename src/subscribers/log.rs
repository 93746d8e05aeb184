//! # LogWriter — events to `tracing`
//!
//! The default subscriber. Every [`Event`] is written through the `tracing`
//! macros so it lands wherever the application installed its subscriber.
//!
//! | Kind               | Level   |
//! |--------------------|---------|
//! | `InternalError`    | `error` |
//! | `ReferenceLeaked`  | `warn`  |
//! | `RetryScheduled`   | `debug` |
//! | `RetryExhausted`   | `debug` |

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default, Debug)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::InternalError => {
                tracing::error!(
                    seq = e.seq,
                    context = e.context.as_deref().unwrap_or("unknown"),
                    error = e.error.as_deref().unwrap_or("unknown"),
                    "internal error"
                );
            }
            EventKind::ReferenceLeaked => {
                tracing::warn!(
                    seq = e.seq,
                    reference = e.reference.as_deref().unwrap_or("unknown"),
                    stack = ?e.stack,
                    "reference leaked"
                );
            }
            EventKind::RetryScheduled => {
                tracing::debug!(
                    seq = e.seq,
                    attempt = e.attempt,
                    delay = ?e.delay,
                    error = e.error.as_deref(),
                    "retry scheduled"
                );
            }
            EventKind::RetryExhausted => {
                tracing::debug!(
                    seq = e.seq,
                    attempt = e.attempt,
                    error = e.error.as_deref(),
                    "retry exhausted"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
