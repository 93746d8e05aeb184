//! Stages: write-once outcome cells with listeners and transforms.
//!
//! ## Contents
//! - [`Stage`]        the state machine (`complete`/`fail`/`cancel`, listeners, `join`)
//! - [`Outcome`]      the decided terminal state
//! - [`StageFuture`]  awaiting a stage from async code
//!
//! ## States
//! ```text
//!            complete(v)
//!         ┌──────────────► Completed(v)
//! Pending ├──────────────► Failed(cause)
//!         │  fail(cause)
//!         └──────────────► Cancelled
//!            cancel()
//! ```
//! Terminal states are final. Transforms (`then_apply`, `then_compose`, and the
//! failure/cancellation counterparts) live in `transform.rs` and build on the
//! same listener mechanism.

mod future;
mod listener;
mod outcome;
#[allow(clippy::module_inception)]
mod stage;
mod transform;

pub use future::StageFuture;
pub use outcome::Outcome;
pub(crate) use stage::WeakStage;
pub use stage::Stage;
