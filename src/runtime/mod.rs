//! Runtime seams injected into the library.
//!
//! The library owns no threads and no timers. Everything that needs one is
//! handed an implementation of these traits at construction time:
//!
//! - [`Executor`]  runs a unit of work somewhere else (threaded callers,
//!   `eventually_collect` driver, `Framework::call`)
//! - [`Scheduler`] runs a unit of work after a delay (retry backoff)
//! - [`Clock`]     reads the current time (retry deadlines and history offsets)
//!
//! Tokio-backed implementations ([`TokioExecutor`], [`TokioScheduler`]) and the
//! clocks ([`SystemClock`], [`ManualClock`]) are provided.

mod clock;
mod executor;
mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{Executor, TokioExecutor, Work};
pub use scheduler::{Scheduled, Scheduler, TokioScheduler};
