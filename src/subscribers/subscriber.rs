//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging diagnostics
//! (logging, metrics, leak tracking) into the library.
//!
//! ## Rules
//! - Events are delivered **synchronously** on the thread that raised them,
//!   which may be any thread running a callback.
//! - A panicking subscriber is isolated: the panic is logged and the remaining
//!   subscribers still see the event.
//! - Subscribers must not block; hand heavy work off to a queue of your own.

use crate::events::Event;

/// Diagnostic event subscriber.
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose - override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
