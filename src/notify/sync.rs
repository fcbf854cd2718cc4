//! Background sync
//!
//! A registered sync tag triggers a call to the server's sync endpoint.
//! Retry scheduling belongs to the host; this only reports success.

use reqwest::Method;
use tracing::{error, info, warn};

use crate::config::RouterConfig;
use crate::net::{FetchOptions, Fetcher, RequestDescriptor};

/// Invoke the sync endpoint; true on a 2xx response
pub async fn sync_now(fetcher: &dyn Fetcher, config: &RouterConfig) -> bool {
    let url = match config.resolve(&config.sync_endpoint) {
        Ok(url) => url,
        Err(e) => {
            error!(endpoint = %config.sync_endpoint, error = %e, "Invalid sync endpoint");
            return false;
        }
    };

    let request = RequestDescriptor::new(Method::GET, url);
    match fetcher.fetch(&request, FetchOptions::same_origin()).await {
        Ok(response) if response.status().is_success() => {
            info!(status = response.status().as_u16(), "Background sync completed");
            true
        }
        Ok(response) => {
            warn!(status = response.status().as_u16(), "Background sync rejected by server");
            false
        }
        Err(e) => {
            error!(error = %e, "Background sync failed");
            false
        }
    }
}
