//! Client host backed by the IPC connections
//!
//! The daemon has no windowing surface of its own: notifications and
//! window requests are logged for the connected front end, and the clients
//! claimed on activation are the currently open socket connections.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::host::{ClientHost, HostError};
use crate::notify::NotificationOptions;

pub struct IpcHost {
    connection_count: Arc<RwLock<u32>>,
    shown: RwLock<HashSet<String>>,
}

impl IpcHost {
    pub fn new(connection_count: Arc<RwLock<u32>>) -> Self {
        Self {
            connection_count,
            shown: RwLock::new(HashSet::new()),
        }
    }

    /// Tags of notifications currently on display
    pub async fn shown(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.shown.read().await.iter().cloned().collect();
        tags.sort();
        tags
    }
}

#[async_trait]
impl ClientHost for IpcHost {
    async fn claim_clients(&self) -> Result<usize, HostError> {
        let count = *self.connection_count.read().await as usize;
        info!(clients = count, "Claimed connected clients");
        Ok(count)
    }

    async fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<(), HostError> {
        info!(title = title, body = %options.body, "Showing notification");
        self.shown.write().await.insert(title.to_string());
        Ok(())
    }

    async fn close_notification(&self, tag: &str) -> Result<(), HostError> {
        if !self.shown.write().await.remove(tag) {
            debug!(tag = tag, "Closing notification that was not shown");
        }
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<(), HostError> {
        info!(url = %url, "Opening window");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;

    #[tokio::test]
    async fn test_claim_counts_connections() {
        let connections = Arc::new(RwLock::new(3));
        let host = IpcHost::new(Arc::clone(&connections));
        assert_eq!(host.claim_clients().await.unwrap(), 3);

        *connections.write().await = 0;
        assert_eq!(host.claim_clients().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_show_and_close() {
        let host = IpcHost::new(Arc::new(RwLock::new(0)));
        let options = NotificationOptions::for_push(&NotificationConfig::default(), None);
        host.show_notification("SwiftSync", &options).await.unwrap();
        assert_eq!(host.shown().await, vec!["SwiftSync"]);

        host.close_notification("SwiftSync").await.unwrap();
        host.close_notification("SwiftSync").await.unwrap();
        assert!(host.shown().await.is_empty());
    }
}
