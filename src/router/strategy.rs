//! Strategy Executor
//!
//! Runs one of three caching strategies against the network and the cache
//! storage. Store writes are spawned in the background on a snapshot of the
//! response and handed back through [`KeepAlive`]; a failed write is logged
//! and never affects the response already returned.

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::classify::RequestClass;
use super::keepalive::KeepAlive;
use crate::cache::{CacheStorage, StoreScope};
use crate::config::{RouterConfig, API_OFFLINE_MESSAGE};
use crate::net::{FetchOptions, Fetcher, NetworkError, RequestDescriptor, Response};

/// What to synthesize when a network-only fetch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Propagate the network failure
    None,
    /// 503 with a JSON `{"error": ...}` body
    JsonError,
}

/// Caching strategy for a request class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkOnly { fallback: Fallback },
    CacheFirst,
    NetworkFirst,
}

impl Strategy {
    /// Strategy for a class; `None` when the router declines the request
    pub fn for_class(class: RequestClass) -> Option<Self> {
        match class {
            RequestClass::Ignore => None,
            RequestClass::Bypass | RequestClass::Auth => Some(Strategy::NetworkOnly {
                fallback: Fallback::None,
            }),
            RequestClass::Api => Some(Strategy::NetworkOnly {
                fallback: Fallback::JsonError,
            }),
            RequestClass::Static => Some(Strategy::CacheFirst),
            RequestClass::Generic => Some(Strategy::NetworkFirst),
        }
    }
}

/// Where a response came from
#[derive(Debug, Clone)]
pub enum Outcome {
    Network(Response),
    Cached(Response),
    Fallback(Response),
}

impl Outcome {
    pub fn response(&self) -> &Response {
        match self {
            Outcome::Network(r) | Outcome::Cached(r) | Outcome::Fallback(r) => r,
        }
    }

    pub fn into_response(self) -> Response {
        match self {
            Outcome::Network(r) | Outcome::Cached(r) | Outcome::Fallback(r) => r,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.response().status()
    }

    pub fn source(&self) -> &'static str {
        match self {
            Outcome::Network(_) => "network",
            Outcome::Cached(_) => "cache",
            Outcome::Fallback(_) => "fallback",
        }
    }
}

/// A routed response plus the background work it started
#[derive(Debug)]
pub struct Handled {
    pub class: RequestClass,
    pub outcome: Outcome,
    pub keep_alive: KeepAlive,
}

/// Executes strategies against a fetcher and a cache storage
#[derive(Clone)]
pub struct StrategyExecutor {
    config: Arc<RouterConfig>,
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn CacheStorage>,
}

impl StrategyExecutor {
    pub fn new(
        config: Arc<RouterConfig>,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
    ) -> Self {
        Self {
            config,
            fetcher,
            storage,
        }
    }

    /// Run a strategy for a request
    pub async fn execute(
        &self,
        strategy: Strategy,
        request: &RequestDescriptor,
    ) -> Result<(Outcome, KeepAlive), NetworkError> {
        let mut keep_alive = KeepAlive::new();
        let outcome = match strategy {
            Strategy::NetworkOnly { fallback } => self.network_only(request, fallback).await?,
            Strategy::CacheFirst => self.cache_first(request, &mut keep_alive).await?,
            Strategy::NetworkFirst => self.network_first(request, &mut keep_alive).await,
        };
        Ok((outcome, keep_alive))
    }

    async fn network_only(
        &self,
        request: &RequestDescriptor,
        fallback: Fallback,
    ) -> Result<Outcome, NetworkError> {
        match self.fetcher.fetch(request, FetchOptions::same_origin()).await {
            Ok(response) => Ok(Outcome::Network(response)),
            Err(e) => match fallback {
                Fallback::None => Err(e),
                Fallback::JsonError => {
                    info!(url = %request.url(), error = %e, "API offline, serving JSON fallback");
                    Ok(Outcome::Fallback(Response::json_error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        API_OFFLINE_MESSAGE,
                    )))
                }
            },
        }
    }

    async fn cache_first(
        &self,
        request: &RequestDescriptor,
        keep_alive: &mut KeepAlive,
    ) -> Result<Outcome, NetworkError> {
        if let Some(cached) = self.lookup(request).await {
            debug!(url = %request.url(), "Serving static asset from cache");
            return Ok(Outcome::Cached(cached));
        }

        let response = self.fetcher.fetch(request, FetchOptions::same_origin()).await?;
        if response.is_cacheable() {
            keep_alive.hold(self.spawn_store(request, &response));
        }
        Ok(Outcome::Network(response))
    }

    async fn network_first(
        &self,
        request: &RequestDescriptor,
        keep_alive: &mut KeepAlive,
    ) -> Outcome {
        match self.fetcher.fetch(request, FetchOptions::same_origin()).await {
            Ok(response) if !response.is_error_kind() => {
                if response.is_cacheable() {
                    keep_alive.hold(self.spawn_store(request, &response));
                }
                return Outcome::Network(response);
            }
            Ok(_) => {
                debug!(url = %request.url(), "Network returned an error response, trying cache");
            }
            Err(e) => {
                debug!(url = %request.url(), error = %e, "Network failed, trying cache");
            }
        }

        if let Some(cached) = self.lookup(request).await {
            return Outcome::Cached(cached);
        }

        if request.accepts_html() {
            if let Some(root) = self.lookup_root(request).await {
                info!(url = %request.url(), "Serving cached root document offline");
                return Outcome::Cached(root);
            }
        }

        info!(url = %request.url(), "Offline with nothing cached");
        Outcome::Fallback(Response::offline())
    }

    /// Combined-store lookup; storage failures read as a miss
    async fn lookup(&self, request: &RequestDescriptor) -> Option<Response> {
        match self.storage.lookup(&StoreScope::All, request).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %request.url(), error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn lookup_root(&self, request: &RequestDescriptor) -> Option<Response> {
        let root_url = match self.config.root_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Invalid root document URL");
                return None;
            }
        };
        let root = RequestDescriptor::get(root_url).with_headers(request.headers().clone());
        self.lookup(&root).await
    }

    /// Write a snapshot of the response into the runtime store in the background
    fn spawn_store(&self, request: &RequestDescriptor, response: &Response) -> tokio::task::JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let store = self.config.runtime_name();
        let request = request.clone();
        let snapshot = response.snapshot();

        tokio::spawn(async move {
            if let Err(e) = storage.put(&store, &request, snapshot).await {
                warn!(store = %store, url = %request.url(), error = %e, "Failed to cache response");
            }
        })
    }
}
