//! Execution policy for user callbacks.
//!
//! Every piece of user code the library runs (listeners, transforms, reducers,
//! setup/teardown, retry actions) goes through a [`Caller`], which decides
//! *where* it runs and guarantees that nothing it throws reaches the stage
//! machinery.
//!
//! ## Contents
//! - [`Caller`]              the contract (`execute`, `is_threaded`, diagnostic hooks)
//! - [`DirectCaller`]        inline on the calling thread
//! - [`ThreadedCaller`]      always on an [`Executor`](crate::Executor)
//! - [`RecursionSafeCaller`] inline until a per-thread depth limit, then hand off
//!
//! ## Choosing a caller
//! ```text
//! DirectCaller          → cheapest; long synchronous chains grow the native stack
//! ThreadedCaller        → every callback on the executor; siblings may run concurrently
//! RecursionSafeCaller   → DirectCaller speed with a bounded stack (trampolines past the limit)
//! ```

mod caller;
mod direct;
mod recursion;
mod threaded;

pub use caller::Caller;
pub use direct::DirectCaller;
pub use recursion::RecursionSafeCaller;
pub use threaded::ThreadedCaller;

use std::panic::AssertUnwindSafe;

use crate::error::Cause;

/// Runs `f`, turning a panic into a [`Cause`].
pub(crate) fn guard<R>(f: impl FnOnce() -> R) -> Result<R, Cause> {
    std::panic::catch_unwind(AssertUnwindSafe(f)).map_err(Cause::from_panic)
}
