//! Keep-alive handles
//!
//! Work a handler starts but does not wait for (store writes, cache cleanup)
//! is collected here and handed back to the host, which must await it before
//! tearing the worker down. Dropping a [`KeepAlive`] detaches the tasks.

use tokio::task::JoinHandle;
use tracing::warn;

/// Pending background tasks spawned while handling an event
#[derive(Debug, Default)]
pub struct KeepAlive {
    tasks: Vec<JoinHandle<()>>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task the host must wait for
    pub fn hold(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every held task to finish
    pub async fn settle(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task did not complete");
            }
        }
    }
}
