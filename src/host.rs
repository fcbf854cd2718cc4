//! Client host seam
//!
//! Everything the router asks of the environment that embeds it besides the
//! network and cache storage: taking over client connections and showing
//! notifications or windows.

use async_trait::async_trait;
use url::Url;

use crate::notify::NotificationOptions;

/// Host-side failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Host rejected request: {0}")]
    Rejected(String),
}

/// Environment hosting the router
#[async_trait]
pub trait ClientHost: Send + Sync {
    /// Take control of every open client; returns how many were claimed
    async fn claim_clients(&self) -> Result<usize, HostError>;

    /// Display a notification
    async fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<(), HostError>;

    /// Dismiss a displayed notification
    async fn close_notification(&self, tag: &str) -> Result<(), HostError>;

    /// Open a URL in a new client window
    async fn open_window(&self, url: &Url) -> Result<(), HostError>;
}
