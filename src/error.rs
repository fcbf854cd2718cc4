//! Crate-level error type

use crate::cache::StorageError;
use crate::host::HostError;
use crate::lifecycle::LifecycleError;
use crate::net::NetworkError;
use crate::worker::EventName;

/// Failure of an event handler
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Version '{0}' is already current")]
    AlreadyCurrent(String),

    #[error("No handler registered for '{0}'")]
    NoHandler(EventName),

    #[error("Handler for '{event}' did not complete: {reason}")]
    TaskFailed { event: EventName, reason: String },
}
