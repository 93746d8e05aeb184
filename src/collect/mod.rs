//! Fan-in: reduce many child stages to one parent stage.
//!
//! ## Contents
//! - [`collect`], [`collect_with`]               buffered; every value kept until the end
//! - [`stream_collect`], [`stream_collect_with`] values streamed into a [`StreamCollector`]
//! - [`eventually_collect`], [`eventually_collect_with`] lazily created children, bounded parallelism
//! - [`collect_and_discard`]                     wait for all, keep nothing
//!
//! ## Aggregation policy
//! ```text
//! all children accounted for (exactly one thread observes the countdown hit zero)
//!   ├─ ≥1 failed    → parent fails: CollectError carrier, child causes suppressed in arrival order
//!   ├─ ≥1 cancelled → parent cancelled
//!   └─ otherwise    → reducer / collector result (a panic fails the parent)
//! ```
//!
//! ## Cancellation
//! Cancelling the parent cancels every child still pending. Children are
//! referenced weakly: the collector never keeps a child alive.

mod buffered;
mod eventually;
mod job;
mod stream;

pub use buffered::{collect, collect_with};
pub use eventually::{eventually_collect, eventually_collect_with};
pub use stream::{Counts, StreamCollector, collect_and_discard, stream_collect, stream_collect_with};
