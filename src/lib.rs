//! # stagecraft
//!
//! **Stagecraft** is a small coordination library for in-process asynchronous
//! work built on a single primitive: the [`Stage`], a value that completes,
//! fails or is cancelled exactly once and notifies its listeners.
//!
//! On top of stages it provides fan-in collectors, reference-counted resources
//! with an explicit lifecycle, and a retry runner. Where callbacks run is
//! decided by a pluggable [`Caller`]; threads and timers are injected through
//! the [`Executor`], [`Scheduler`] and [`Clock`] seams.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │  Collectors  │   │   Managed    │   │    Retry     │   │  Transforms  │
//!   │ collect/...  │   │ start/borrow │   │ policy+timer │   │ then_apply/..│
//!   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!          └──────────────────┴─────────┬────────┴──────────────────┘
//!                                       ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Stage<T>                                                         │
//! │  - Pending(listeners) ──first transition wins──► Done(Outcome)    │
//! │  - listeners drained under the lock, dispatched outside it        │
//! │  - bind: cancelling a stage cancels the stages bound to it        │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Caller (execution policy)                                        │
//! │  - DirectCaller        inline                                     │
//! │  - ThreadedCaller      Executor                                   │
//! │  - RecursionSafeCaller inline until depth limit, then Executor    │
//! └──────────────┬────────────────────────────────────────┬───────────┘
//!                ▼                                        ▼
//!        Executor / Scheduler / Clock            internal_error / reference_leaked
//!        (tokio-backed or injected)                         │
//!                                                           ▼
//!                                               Event ──► SubscriberSet
//!                                                          ├─► LogWriter (tracing)
//!                                                          └─► custom subscribers
//! ```
//!
//! ### Stage lifecycle
//! ```text
//! Stage::pending(caller)
//!   ├─► when_done / then_apply / bind ...   (listeners queue up)
//!   │
//!   ├─ complete(v) ─┐
//!   ├─ fail(cause) ─┼─► first call wins (returns true), later calls return false
//!   └─ cancel()    ─┘        │
//!                            ├─► state = Done(outcome)
//!                            └─► every queued listener dispatched through the caller
//!
//! listener registered after Done ─► dispatched immediately
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / functions                          |
//! |-------------------|--------------------------------------------------------------------|------------------------------------------------|
//! | **Stages**        | One-shot outcome with listeners, transforms and blocking/async join.| [`Stage`], [`Outcome`], [`StageFuture`]        |
//! | **Callers**       | Where user callbacks run; panics never reach the stage machinery.  | [`Caller`], [`DirectCaller`], [`RecursionSafeCaller`] |
//! | **Collectors**    | Fan-in of many stages (buffered, streaming, bounded parallelism).  | [`collect()`], [`stream_collect`], [`eventually_collect`] |
//! | **Managed**       | Start/stop/borrow lifecycle with lease counting and reload.        | [`Managed`], [`ReloadableManaged`], [`Borrowed`] |
//! | **Retry**         | Re-run a stage-producing action under a policy.                    | [`RetryPolicy`], [`retry_until_completed`]     |
//! | **Diagnostics**   | Internal errors, leaks and retries as events.                      | [`Event`], [`Subscribe`], [`LogWriter`]        |
//! | **Errors**        | Shared failure causes and typed library errors.                    | [`Cause`], [`JoinError`], [`CollectError`]     |
//! | **Configuration** | Builder wiring callers and runtime seams.                          | [`Framework`], [`FrameworkBuilder`], [`Config`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stagecraft::{Framework, JoinError, RetryPolicy};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = tokio::runtime::Runtime::new()?;
//!     let fw = Framework::builder()
//!         .with_tokio(rt.handle().clone())
//!         .recursion_limit(256)
//!         .build()?;
//!
//!     // Fan-in: results keep input order.
//!     let parts = (1..=3).map(|n| fw.call(move || Ok::<_, stagecraft::Cause>(n * 10)));
//!     let total = fw.collect(parts).then_apply(|v| v.into_iter().sum::<i32>());
//!     assert_eq!(total.join_timeout(Duration::from_secs(5))?, 60);
//!
//!     // Retry: the third attempt succeeds.
//!     let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
//!     let inner = fw.clone();
//!     let retried = fw.retry_until_completed(
//!         &RetryPolicy::linear(Duration::from_millis(5)),
//!         move || match attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
//!             0 | 1 => inner.failed("not yet"),
//!             n => inner.completed(n),
//!         },
//!     );
//!     let result = retried.join_timeout(Duration::from_secs(5))?;
//!     assert_eq!((result.value, result.errors.len()), (2, 2));
//!
//!     // Cancellation is just another outcome.
//!     let pending = fw.completable::<u8>();
//!     pending.cancel();
//!     assert!(matches!(pending.join(), Err(JoinError::Cancelled)));
//!     Ok(())
//! }
//! ```
mod caller;
mod collect;
mod core;
mod error;
mod events;
mod managed;
mod retry;
mod runtime;
mod stage;
mod subscribers;

// ---- Public re-exports ----

pub use caller::{Caller, DirectCaller, RecursionSafeCaller, ThreadedCaller};
pub use collect::{
    Counts, StreamCollector, collect, collect_and_discard, collect_with, eventually_collect,
    eventually_collect_with, stream_collect, stream_collect_with,
};
pub use core::{Config, Framework, FrameworkBuilder};
pub use error::{BuildError, Cause, CollectError, JoinError, ManagedError, PanicError, RetryError};
pub use events::{Event, EventKind};
pub use managed::{Borrowed, Managed, ManagedState, ReloadableManaged};
pub use retry::{
    JitterPolicy, RetryAttempt, RetryDecision, RetryDecisions, RetryPolicy, RetryResult,
    retry_until_completed,
};
pub use runtime::{
    Clock, Executor, ManualClock, Scheduled, Scheduler, SystemClock, TokioExecutor,
    TokioScheduler, Work,
};
pub use stage::{Outcome, Stage, StageFuture};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
