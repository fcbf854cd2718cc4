//! SwiftSync offline router
//!
//! Intercepts page requests and answers them from the network, a versioned
//! cache store, or a synthesized fallback, depending on what the request is.
//! The [`worker::Worker`] receives host events (install, activate, fetch,
//! message, sync, push, notification click) and the [`ipc`] module exposes
//! them over a Unix socket.

pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod ipc;
pub mod lifecycle;
pub mod net;
pub mod notify;
pub mod router;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::RouterConfig;
pub use error::RouterError;
pub use worker::{Event, EventOutcome, Worker};
