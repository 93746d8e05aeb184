//! Reference-counted resources with an explicit lifecycle.
//!
//! ## Contents
//! - [`Managed`]           start/stop/borrow/doto over one value
//! - [`ReloadableManaged`] adds `reload`, swapping in a fresh value
//! - [`Borrowed`]          a lease on the value; release exactly once
//! - [`ManagedState`]      `Initialized → Started → Stopping → Stopped`
//!
//! ## Leases
//! ```text
//! count = 1 (implicit lease, owned by the lifecycle)
//! borrow()   → +1 (only while Started)
//! release()  → -1 (idempotent per handle)
//! stop()/reload() drops the implicit lease; count == 0 → teardown(value)
//! ```

mod borrowed;
mod lease;
#[allow(clippy::module_inception)]
mod managed;
mod reloadable;
mod state;

pub use borrowed::Borrowed;
pub use managed::Managed;
pub use reloadable::ReloadableManaged;
pub use state::ManagedState;
