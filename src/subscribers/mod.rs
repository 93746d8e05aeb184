//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! used by callers, and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Caller::internal_error / reference_leaked ──► Event ──► SubscriberSet::emit(&Event)
//! retry runner (scheduled / exhausted)      ──┘                 │
//!                                                 ┌─────────────┼─────────────┐
//!                                                 ▼             ▼             ▼
//!                                             LogWriter      Metrics       Custom
//!                                             (tracing)
//! ```
//!
//! ## Implementing custom subscribers
//! ```
//! use stagecraft::{Event, EventKind, Subscribe};
//!
//! struct LeakCounter(std::sync::atomic::AtomicUsize);
//!
//! impl Subscribe for LeakCounter {
//!     fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::ReferenceLeaked {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//! }
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
