//! # Retrying stage-producing actions.
//!
//! [`retry_until_completed`] calls an action, waits for its stage, and asks a
//! [`RetryDecisions`] stream what to do with each failure.
//!
//! ## Contents
//! - [`RetryPolicy`]   stateless policy (linear, exponential, timed, jittered)
//! - [`RetryDecision`] one answer: retry after a backoff, or stop
//! - [`JitterPolicy`]  randomization applied to a backoff
//! - [`RetryResult`]   successful value plus the failures before it
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//! use stagecraft::{retry_until_completed, Caller, DirectCaller, RetryPolicy, Stage, SystemClock};
//!
//! let caller: Arc<dyn Caller> = Arc::new(DirectCaller::default());
//! let calls = Arc::new(AtomicU32::new(0));
//! let c = caller.clone();
//!
//! let result = retry_until_completed(
//!     caller,
//!     Arc::new(SystemClock),
//!     None,
//!     &RetryPolicy::linear(Duration::ZERO),
//!     move || match calls.fetch_add(1, Ordering::SeqCst) {
//!         0 | 1 => Stage::failed(c.clone(), "flaky"),
//!         n => Stage::completed(c.clone(), n),
//!     },
//! );
//!
//! let result = result.join().unwrap();
//! assert_eq!(result.value, 2);
//! assert_eq!(result.errors.len(), 2);
//! ```

mod jitter;
mod policy;
mod result;
mod runner;

pub use jitter::JitterPolicy;
pub use policy::{RetryDecision, RetryDecisions, RetryPolicy};
pub use result::{RetryAttempt, RetryResult};
pub use runner::retry_until_completed;
