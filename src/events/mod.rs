//! Diagnostic events.
//!
//! The library never prints anything itself: internal errors, leaked borrows
//! and retry scheduling are turned into [`Event`]s and handed to the caller's
//! subscribers (see [`crate::subscribers`]).
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//!
//! ## Quick reference
//! - **Publishers**: [`Caller`](crate::Caller) implementations (internal errors,
//!   leaked references) and the retry runner (scheduled retries, exhaustion).
//! - **Consumers**: [`SubscriberSet`](crate::SubscriberSet) and the
//!   [`Subscribe`](crate::Subscribe) implementations it fans out to.

mod event;

pub use event::{Event, EventKind};
