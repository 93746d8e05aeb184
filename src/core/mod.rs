//! Wiring: configuration, builder and the framework context.
//!
//! The public API from this module is [`Framework`], built through
//! [`FrameworkBuilder`] from a [`Config`].
//!
//! Internal modules:
//! - [`config`]: plain settings with documented defaults and sentinel values;
//! - [`builder`]: validates the config and picks the caller;
//! - [`framework`]: the injected context exposing every operation.

mod builder;
mod config;
mod framework;

pub use builder::FrameworkBuilder;
pub use config::Config;
pub use framework::Framework;
