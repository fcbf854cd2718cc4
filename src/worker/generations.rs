//! Generation hand-off
//!
//! Holds the worker currently serving events. An upgrade installs and
//! activates the next version alongside it, swaps it in, and marks the old
//! one superseded. Tasks already running on the old worker keep their handle.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::Worker;
use crate::error::RouterError;
use crate::lifecycle::{ActivateReport, InstallReport};

/// What an upgrade did
#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub from: String,
    pub to: String,
    pub install: InstallReport,
    pub activate: ActivateReport,
}

pub struct Generations {
    current: RwLock<Arc<Worker>>,
    upgrading: Mutex<()>,
}

impl Generations {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self {
            current: RwLock::new(worker),
            upgrading: Mutex::new(()),
        }
    }

    /// Worker that new events go to
    pub async fn current(&self) -> Arc<Worker> {
        Arc::clone(&*self.current.read().await)
    }

    /// Install and activate `version`, then retire the current worker
    ///
    /// On failure the current worker stays in place.
    pub async fn upgrade(&self, version: &str) -> Result<UpgradeReport, RouterError> {
        let _upgrading = self.upgrading.lock().await;

        let previous = self.current().await;
        if previous.config().version == version {
            return Err(RouterError::AlreadyCurrent(version.to_string()));
        }

        info!(from = %previous.config().version, to = version, "Upgrading");
        let next = Arc::new(previous.successor(version));
        let install = next.lifecycle().install().await?;
        let activate = next.lifecycle().activate().await?;

        *self.current.write().await = Arc::clone(&next);

        if let Err(e) = previous.lifecycle().supersede().await {
            warn!(version = %previous.config().version, error = %e, "Previous generation not superseded");
        }

        Ok(UpgradeReport {
            from: previous.config().version.clone(),
            to: version.to_string(),
            install,
            activate,
        })
    }
}
