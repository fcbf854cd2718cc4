//! Network fetcher
//!
//! The [`Fetcher`] trait is the router's only path to the network.
//! [`HttpFetcher`] implements it with reqwest.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, COOKIE};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use super::errors::NetworkError;
use super::types::{RequestDescriptor, Response, ResponseKind};

/// Credential scope of a forwarded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    /// Never send cookies or authorization
    Omit,
    /// Send them only to the router's own origin
    SameOrigin,
    /// Always send them
    Include,
}

/// Options applied to a forwarded request
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub credentials: Credentials,
    /// Forward the original request headers
    pub forward_headers: bool,
}

impl FetchOptions {
    /// Original headers, same-origin credentials
    pub fn same_origin() -> Self {
        Self {
            credentials: Credentials::SameOrigin,
            forward_headers: true,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::same_origin()
    }
}

/// Issues requests to the network
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &RequestDescriptor,
        options: FetchOptions,
    ) -> Result<Response, NetworkError>;
}

/// reqwest-backed fetcher scoped to an origin
#[derive(Clone)]
pub struct HttpFetcher {
    http_client: Client,
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher for the given origin
    ///
    /// No client timeout is set; requests live as long as the server keeps
    /// the connection.
    pub fn new(origin: Url) -> anyhow::Result<Self> {
        use anyhow::Context;

        let http_client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http_client,
            origin,
        })
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// Headers to forward under the given options
    fn outgoing_headers(&self, request: &RequestDescriptor, options: FetchOptions) -> HeaderMap {
        if !options.forward_headers {
            return HeaderMap::new();
        }

        let mut headers = request.headers().clone();
        let send_credentials = match options.credentials {
            Credentials::Omit => false,
            Credentials::SameOrigin => self.is_same_origin(request.url()),
            Credentials::Include => true,
        };
        if !send_credentials {
            headers.remove(COOKIE);
            headers.remove(AUTHORIZATION);
        }
        headers
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: &RequestDescriptor,
        options: FetchOptions,
    ) -> Result<Response, NetworkError> {
        let url = request.url().clone();
        debug!(method = %request.method(), url = %url, "Fetching from network");

        let response = self
            .http_client
            .request(request.method().clone(), url.clone())
            .headers(self.outgoing_headers(request, options))
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Network fetch failed");
                NetworkError::from_reqwest(&e)
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let kind = if self.is_same_origin(&url) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };

        // A connection dropped mid-body is the same failure as no response
        let body = response.bytes().await.map_err(|e| {
            warn!(url = %url, error = %e, "Response body aborted");
            NetworkError::Aborted(e.to_string())
        })?;

        debug!(url = %url, status = status.as_u16(), size = body.len(), "Network response");
        Ok(Response::new(status, headers, body).with_kind(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, ACCEPT};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Url::parse("http://127.0.0.1:8000").unwrap()).unwrap()
    }

    fn request(url: &str) -> RequestDescriptor {
        RequestDescriptor::get(Url::parse(url).unwrap())
            .with_header(COOKIE, HeaderValue::from_static("session=abc"))
            .with_header(ACCEPT, HeaderValue::from_static("text/html"))
    }

    #[test]
    fn test_same_origin_keeps_credentials() {
        let headers = fetcher().outgoing_headers(
            &request("http://127.0.0.1:8000/login"),
            FetchOptions::same_origin(),
        );
        assert_eq!(headers[COOKIE], "session=abc");
        assert_eq!(headers[ACCEPT], "text/html");
    }

    #[test]
    fn test_cross_origin_drops_credentials() {
        let headers = fetcher().outgoing_headers(
            &request("https://fonts.googleapis.com/css2"),
            FetchOptions::same_origin(),
        );
        assert!(headers.get(COOKIE).is_none());
        assert_eq!(headers[ACCEPT], "text/html");
    }

    #[test]
    fn test_omit_and_no_forwarding() {
        let f = fetcher();
        let req = request("http://127.0.0.1:8000/");
        let omit = FetchOptions {
            credentials: Credentials::Omit,
            forward_headers: true,
        };
        assert!(f.outgoing_headers(&req, omit).get(COOKIE).is_none());

        let bare = FetchOptions {
            credentials: Credentials::Include,
            forward_headers: false,
        };
        assert!(f.outgoing_headers(&req, bare).is_empty());
    }
}
