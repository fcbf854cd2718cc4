//! Request routing: classification and strategy execution

pub mod classify;
pub mod keepalive;
pub mod strategy;

use std::sync::Arc;

use tracing::debug;

pub use classify::{Classifier, RequestClass};
pub use keepalive::KeepAlive;
pub use strategy::{Fallback, Handled, Outcome, Strategy, StrategyExecutor};

use crate::cache::CacheStorage;
use crate::config::RouterConfig;
use crate::net::{Fetcher, NetworkError, RequestDescriptor};

/// Routes a request to the network, a store, or a synthesized fallback
#[derive(Clone)]
pub struct Router {
    classifier: Classifier,
    executor: StrategyExecutor,
}

impl Router {
    pub fn new(
        config: Arc<RouterConfig>,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn CacheStorage>,
    ) -> Self {
        Self {
            classifier: Classifier::new(&config),
            executor: StrategyExecutor::new(config, fetcher, storage),
        }
    }

    pub fn classify(&self, request: &RequestDescriptor) -> RequestClass {
        self.classifier.classify(request)
    }

    /// Route a request
    ///
    /// Returns `Ok(None)` when the router declines the request and the
    /// platform default applies. Network failures of `auth`, `bypass` and
    /// uncached `static` requests are returned as errors.
    pub async fn route(&self, request: &RequestDescriptor) -> Result<Option<Handled>, NetworkError> {
        let class = self.classify(request);
        let Some(strategy) = Strategy::for_class(class) else {
            debug!(url = %request.url(), "Declining non-http request");
            return Ok(None);
        };

        debug!(
            method = %request.method(),
            url = %request.url(),
            class = %class,
            strategy = ?strategy,
            "Routing request"
        );

        let (outcome, keep_alive) = self.executor.execute(strategy, request).await?;
        Ok(Some(Handled {
            class,
            outcome,
            keep_alive,
        }))
    }
}
