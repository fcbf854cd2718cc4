//! Lifecycle state machine
//!
//! `installing -> waiting -> active -> superseded`
//!
//! Install populates the precache store for the current version and requests
//! skip-waiting, so activation is eligible as soon as install finishes.
//! Activation deletes stale-generation stores and claims open clients.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, StorageError};
use crate::config::RouterConfig;
use crate::host::{ClientHost, HostError};
use crate::net::{FetchOptions, Fetcher, RequestDescriptor};

/// Lifecycle states of a router instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    Superseded,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: WorkerState,
    },

    #[error("Activation must wait for the previous instance to close")]
    NotEligible,

    #[error("Cannot start: {0} already in progress")]
    InProgress(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Result of populating the precache store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub store: String,
    /// Manifest entries stored
    pub cached: Vec<String>,
    /// Manifest entries skipped, with the reason
    pub failed: Vec<(String, String)>,
}

/// Result of a version cutover
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stale stores removed
    pub deleted: Vec<String>,
    /// Clients taken over
    pub claimed: usize,
}

struct LifecycleState {
    state: WorkerState,
    skip_waiting: bool,
    /// An older instance still controls clients
    predecessor_active: bool,
    /// Transition currently running; claimed under the write lock
    in_flight: Option<&'static str>,
}

impl LifecycleState {
    fn activation_check(&self) -> Result<(), LifecycleError> {
        if self.state != WorkerState::Waiting {
            return Err(LifecycleError::InvalidTransition {
                action: "activate",
                state: self.state,
            });
        }
        if !self.skip_waiting && self.predecessor_active {
            return Err(LifecycleError::NotEligible);
        }
        Ok(())
    }
}

/// Drives install, activate and cache invalidation for one generation
pub struct LifecycleController {
    config: Arc<RouterConfig>,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
    host: Arc<dyn ClientHost>,
    state: RwLock<LifecycleState>,
}

impl LifecycleController {
    pub fn new(
        config: Arc<RouterConfig>,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
        host: Arc<dyn ClientHost>,
    ) -> Self {
        Self {
            config,
            fetcher,
            storage,
            host,
            state: RwLock::new(LifecycleState {
                state: WorkerState::Installing,
                skip_waiting: false,
                predecessor_active: false,
                in_flight: None,
            }),
        }
    }

    /// Mark that an older generation is still in control
    pub fn with_predecessor(mut self) -> Self {
        self.state.get_mut().predecessor_active = true;
        self
    }

    pub async fn state(&self) -> WorkerState {
        self.state.read().await.state
    }

    pub async fn is_activation_eligible(&self) -> bool {
        let s = self.state.read().await;
        s.in_flight.is_none() && s.activation_check().is_ok()
    }

    /// Claim a transition, failing if another one is running or `check` rejects it
    async fn begin(
        &self,
        action: &'static str,
        check: impl FnOnce(&LifecycleState) -> Result<(), LifecycleError>,
    ) -> Result<(), LifecycleError> {
        let mut s = self.state.write().await;
        if let Some(running) = s.in_flight {
            return Err(LifecycleError::InProgress(running));
        }
        check(&s)?;
        s.in_flight = Some(action);
        Ok(())
    }

    /// Populate the precache store from the manifest
    ///
    /// Every entry is fetched concurrently; a failing entry is logged and
    /// skipped without failing the install.
    pub async fn install(&self) -> Result<InstallReport, LifecycleError> {
        self.begin("install", |s| {
            if s.state != WorkerState::Installing {
                return Err(LifecycleError::InvalidTransition {
                    action: "install",
                    state: s.state,
                });
            }
            Ok(())
        })
        .await?;

        let result = self.populate().await;

        let mut s = self.state.write().await;
        s.in_flight = None;
        let report = result?;
        s.skip_waiting = true;
        s.state = WorkerState::Waiting;
        drop(s);

        info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Install complete, skip-waiting requested"
        );
        Ok(report)
    }

    async fn populate(&self) -> Result<InstallReport, LifecycleError> {
        let store_name = self.config.precache_name();
        info!(store = %store_name, assets = self.config.core_assets.len(), "Installing");
        let store = self.storage.open(&store_name).await?;

        let mut tasks = JoinSet::new();
        for asset in &self.config.core_assets {
            let asset = asset.clone();
            let url = self.config.resolve(&asset);
            let fetcher = Arc::clone(&self.fetcher);
            let store = store.clone();

            tasks.spawn(async move {
                let url = match url {
                    Ok(url) => url,
                    Err(e) => return (asset, Err(format!("invalid URL: {}", e))),
                };
                let request = RequestDescriptor::get(url);
                let result = match fetcher.fetch(&request, FetchOptions::same_origin()).await {
                    Ok(response) if response.is_cacheable() => store
                        .put(&request, response.snapshot())
                        .map_err(|e| e.to_string()),
                    Ok(response) => Err(format!("status {}", response.status().as_u16())),
                    Err(e) => Err(e.to_string()),
                };
                (asset, result)
            });
        }

        let mut report = InstallReport {
            store: store_name,
            ..Default::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((asset, Ok(()))) => {
                    debug!(asset = %asset, "Precached");
                    report.cached.push(asset);
                }
                Ok((asset, Err(reason))) => {
                    warn!(asset = %asset, reason = %reason, "Skipping manifest entry");
                    report.failed.push((asset, reason));
                }
                Err(e) => warn!(error = %e, "Precache task did not complete"),
            }
        }
        report.cached.sort();
        report.failed.sort();
        Ok(report)
    }

    /// Cut over to this generation
    pub async fn activate(&self) -> Result<ActivateReport, LifecycleError> {
        self.begin("activate", LifecycleState::activation_check).await?;
        self.finish_activation().await
    }

    /// Runs with the `activate` transition already claimed
    async fn finish_activation(&self) -> Result<ActivateReport, LifecycleError> {
        let result = self.cut_over().await;

        let mut s = self.state.write().await;
        s.in_flight = None;
        let report = result?;
        s.state = WorkerState::Active;
        s.predecessor_active = false;
        drop(s);

        info!(deleted = report.deleted.len(), claimed = report.claimed, "Active");
        Ok(report)
    }

    async fn cut_over(&self) -> Result<ActivateReport, LifecycleError> {
        info!(version = %self.config.version, "Activating");
        let mut report = ActivateReport::default();
        for name in self.storage.list_all().await? {
            if !self.config.is_stale_store(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    info!(store = %name, "Deleted old cache");
                    report.deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => warn!(store = %name, error = %e, "Failed to delete old cache"),
            }
        }

        report.claimed = match self.host.claim_clients().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Failed to claim clients");
                0
            }
        };
        Ok(report)
    }

    /// Skip the hand-off wait; activates immediately when waiting
    ///
    /// Returns `None` when there was nothing to activate, including when
    /// another caller's activation is already running.
    pub async fn skip_waiting(&self) -> Result<Option<ActivateReport>, LifecycleError> {
        let claimed = {
            let mut s = self.state.write().await;
            s.skip_waiting = true;
            if s.state == WorkerState::Waiting && s.in_flight.is_none() {
                s.in_flight = Some("activate");
                true
            } else {
                false
            }
        };
        if claimed {
            return self.finish_activation().await.map(Some);
        }
        debug!("Skip-waiting recorded");
        Ok(None)
    }

    /// Delete every store carrying the system prefix
    ///
    /// All deletions are attempted; the first failure is returned.
    pub async fn clear_caches(&self) -> Result<Vec<String>, StorageError> {
        let mut deleted = Vec::new();
        let mut first_error = None;

        for name in self.storage.list_all().await? {
            if !self.config.owns_store(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => deleted.push(name),
                Ok(false) => {}
                Err(e) => {
                    warn!(store = %name, error = %e, "Failed to clear cache");
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(deleted = deleted.len(), "Cleared caches");
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// Hand control to a newer generation
    pub async fn supersede(&self) -> Result<(), LifecycleError> {
        let mut s = self.state.write().await;
        if let Some(running) = s.in_flight {
            return Err(LifecycleError::InProgress(running));
        }
        if s.state != WorkerState::Active {
            return Err(LifecycleError::InvalidTransition {
                action: "supersede",
                state: s.state,
            });
        }
        s.state = WorkerState::Superseded;
        info!(version = %self.config.version, "Superseded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::net::Response;
    use crate::test_support::{FlakyStorage, MockFetcher, RecordingHost};
    use std::time::Duration;
    use url::Url;

    const ORIGIN: &str = "http://127.0.0.1:8000";

    struct Fixture {
        controller: LifecycleController,
        fetcher: Arc<MockFetcher>,
        storage: Arc<MemoryCacheStorage>,
        host: Arc<RecordingHost>,
    }

    fn fixture(config: RouterConfig) -> Fixture {
        let fetcher = Arc::new(MockFetcher::new());
        let storage = Arc::new(MemoryCacheStorage::new());
        let host = Arc::new(RecordingHost::new());
        let controller = LifecycleController::new(
            Arc::new(config),
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::clone(&storage) as Arc<dyn CacheStorage>,
            Arc::clone(&host) as Arc<dyn ClientHost>,
        );
        Fixture {
            controller,
            fetcher,
            storage,
            host,
        }
    }

    fn get(path: &str) -> RequestDescriptor {
        RequestDescriptor::get(Url::parse(&format!("{}{}", ORIGIN, path)).unwrap())
    }

    fn manifest_config() -> RouterConfig {
        RouterConfig::new().unwrap().with_core_assets(["/", "/manifest.json", "/offline.css"])
    }

    #[tokio::test]
    async fn test_install_populates_precache() {
        let f = fixture(manifest_config());
        f.fetcher.respond(&format!("{}/", ORIGIN), Response::ok("<html>"));
        f.fetcher.respond(&format!("{}/manifest.json", ORIGIN), Response::ok("{}"));
        f.fetcher.respond(&format!("{}/offline.css", ORIGIN), Response::ok("css"));

        let report = f.controller.install().await.unwrap();
        assert_eq!(report.store, "swiftsync-v1.0.0");
        assert_eq!(report.cached, vec!["/", "/manifest.json", "/offline.css"]);
        assert!(report.failed.is_empty());

        let store = f.storage.get("swiftsync-v1.0.0").await.unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.lookup(&get("/")).unwrap().text(), "<html>");
        assert_eq!(f.controller.state().await, WorkerState::Waiting);
        assert!(f.controller.is_activation_eligible().await);
    }

    #[tokio::test]
    async fn test_install_survives_partial_failure() {
        let f = fixture(manifest_config());
        f.fetcher.respond(&format!("{}/", ORIGIN), Response::ok("<html>"));
        f.fetcher.fail(&format!("{}/manifest.json", ORIGIN));
        // offline.css is unknown to the mock and answers 404

        let report = f.controller.install().await.unwrap();
        assert_eq!(report.cached, vec!["/"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, "/manifest.json");
        assert_eq!(report.failed[1], ("/offline.css".to_string(), "status 404".to_string()));

        // Every entry was attempted
        assert_eq!(f.fetcher.total_calls(), 3);
        assert_eq!(f.controller.state().await, WorkerState::Waiting);
    }

    #[tokio::test]
    async fn test_install_twice_rejected() {
        let f = fixture(manifest_config());
        f.fetcher.set_offline(true);
        f.controller.install().await.unwrap();
        assert!(matches!(
            f.controller.install().await,
            Err(LifecycleError::InvalidTransition { action: "install", .. })
        ));
    }

    #[tokio::test]
    async fn test_install_fails_when_store_cannot_open() {
        let storage = Arc::new(FlakyStorage::new());
        storage.fail_opens(true);
        let controller = LifecycleController::new(
            Arc::new(manifest_config()),
            Arc::new(MockFetcher::new()),
            storage,
            Arc::new(RecordingHost::new()),
        );
        assert!(matches!(
            controller.install().await,
            Err(LifecycleError::Storage(_))
        ));
        assert_eq!(controller.state().await, WorkerState::Installing);
    }

    #[tokio::test]
    async fn test_version_cutover() {
        let f = fixture(RouterConfig::new().unwrap().with_version("v1.1.0").with_core_assets(["/"]));
        f.fetcher.respond(&format!("{}/", ORIGIN), Response::ok("new shell"));
        for name in [
            "swiftsync-v1.0.0",
            "swiftsync-runtime-v1.0.0",
            "swiftsync-runtime",
            "unrelated-store",
        ] {
            f.storage.open(name).await.unwrap();
        }
        f.storage
            .put("swiftsync-runtime", &get("/dashboard"), Response::ok("kept"))
            .await
            .unwrap();

        f.controller.install().await.unwrap();
        let report = f.controller.activate().await.unwrap();

        let mut deleted = report.deleted.clone();
        deleted.sort();
        assert_eq!(deleted, vec!["swiftsync-runtime-v1.0.0", "swiftsync-v1.0.0"]);

        let mut remaining = f.storage.list_all().await.unwrap();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["swiftsync-runtime", "swiftsync-v1.1.0", "unrelated-store"]
        );
        let runtime = f.storage.get("swiftsync-runtime").await.unwrap();
        assert!(runtime.lookup(&get("/dashboard")).is_some());

        assert_eq!(f.controller.state().await, WorkerState::Active);
        assert_eq!(f.host.claim_count(), 1);
        assert_eq!(report.claimed, f.host.client_count());
    }

    #[tokio::test]
    async fn test_activate_requires_waiting() {
        let f = fixture(manifest_config());
        assert!(matches!(
            f.controller.activate().await,
            Err(LifecycleError::InvalidTransition { action: "activate", state: WorkerState::Installing })
        ));
    }

    #[tokio::test]
    async fn test_skip_waiting_activates_from_waiting() {
        let f = fixture(manifest_config());
        f.fetcher.set_offline(true);

        // Before install only the flag is recorded
        assert!(f.controller.skip_waiting().await.unwrap().is_none());
        assert_eq!(f.controller.state().await, WorkerState::Installing);

        f.controller.install().await.unwrap();
        let report = f.controller.skip_waiting().await.unwrap();
        assert!(report.is_some());
        assert_eq!(f.controller.state().await, WorkerState::Active);

        // Already active: nothing to do
        assert!(f.controller.skip_waiting().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_predecessor_blocks_until_skip_waiting() {
        let f = fixture(manifest_config());
        let controller = f.controller.with_predecessor();
        {
            let mut s = controller.state.write().await;
            s.state = WorkerState::Waiting;
        }
        assert!(!controller.is_activation_eligible().await);
        assert!(matches!(controller.activate().await, Err(LifecycleError::NotEligible)));

        controller.skip_waiting().await.unwrap();
        assert_eq!(controller.state().await, WorkerState::Active);
    }

    #[tokio::test]
    async fn test_clear_caches_deletes_prefixed_only() {
        let f = fixture(manifest_config());
        for name in ["swiftsync-v1.0.0", "swiftsync-runtime", "swiftsync-v0.9", "other"] {
            f.storage.open(name).await.unwrap();
        }

        let mut deleted = f.controller.clear_caches().await.unwrap();
        deleted.sort();
        assert_eq!(
            deleted,
            vec!["swiftsync-runtime", "swiftsync-v0.9", "swiftsync-v1.0.0"]
        );
        assert_eq!(f.storage.list_all().await.unwrap(), vec!["other"]);
    }

    #[tokio::test]
    async fn test_clear_caches_with_no_stores() {
        let f = fixture(manifest_config());
        assert!(f.controller.clear_caches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_supersede() {
        let f = fixture(manifest_config());
        assert!(f.controller.supersede().await.is_err());

        f.fetcher.set_offline(true);
        f.controller.install().await.unwrap();
        f.controller.activate().await.unwrap();
        f.controller.supersede().await.unwrap();
        assert_eq!(f.controller.state().await, WorkerState::Superseded);
    }

    #[tokio::test]
    async fn test_activate_and_skip_waiting_claim_once() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_offline(true);
        let host = Arc::new(RecordingHost::new().with_claim_delay(Duration::from_millis(50)));
        let controller = LifecycleController::new(
            Arc::new(manifest_config()),
            fetcher,
            Arc::new(MemoryCacheStorage::new()),
            Arc::clone(&host) as Arc<dyn ClientHost>,
        );
        controller.install().await.unwrap();

        let (activated, skipped) = tokio::join!(controller.activate(), controller.skip_waiting());
        match (activated, skipped) {
            (Ok(_), Ok(None)) => {}
            (Err(LifecycleError::InProgress("activate")), Ok(Some(_))) => {}
            other => panic!("Expected exactly one activation, got {:?}", other),
        }
        assert_eq!(host.claim_count(), 1);
        assert_eq!(controller.state().await, WorkerState::Active);
    }

    #[tokio::test]
    async fn test_concurrent_installs_run_once() {
        let f = fixture(manifest_config());
        f.fetcher.respond(&format!("{}/", ORIGIN), Response::ok("<html>"));

        let (first, second) = tokio::join!(f.controller.install(), f.controller.install());
        let failures: Vec<_> = [&first, &second].into_iter().filter(|r| r.is_err()).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            Err(LifecycleError::InProgress("install")) | Err(LifecycleError::InvalidTransition { .. })
        ));
        assert_eq!(f.fetcher.total_calls(), 3);
        assert_eq!(f.controller.state().await, WorkerState::Waiting);
    }

    #[tokio::test]
    async fn test_activate_completes_when_deletes_fail() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.set_offline(true);
        let storage = Arc::new(FlakyStorage::new());
        storage.inner().open("swiftsync-v0.9.0").await.unwrap();
        let host = Arc::new(RecordingHost::new());
        let controller = LifecycleController::new(
            Arc::new(manifest_config()),
            fetcher,
            Arc::clone(&storage) as Arc<dyn CacheStorage>,
            Arc::clone(&host) as Arc<dyn ClientHost>,
        );
        controller.install().await.unwrap();

        storage.fail_deletes(true);
        let report = controller.activate().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.claimed, host.client_count());
        assert_eq!(controller.state().await, WorkerState::Active);
        assert!(storage
            .list_all()
            .await
            .unwrap()
            .contains(&"swiftsync-v0.9.0".to_string()));
    }

    #[tokio::test]
    async fn test_clear_caches_reports_delete_failure() {
        let storage = Arc::new(FlakyStorage::new());
        storage.inner().open("swiftsync-v1.0.0").await.unwrap();
        storage.fail_deletes(true);
        let controller = LifecycleController::new(
            Arc::new(manifest_config()),
            Arc::new(MockFetcher::new()),
            storage,
            Arc::new(RecordingHost::new()),
        );
        assert!(matches!(
            controller.clear_caches().await,
            Err(StorageError::Unavailable(_))
        ));
    }
}
