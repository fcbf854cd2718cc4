//! Request and response types shared by the fetcher, the stores and the router

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use url::Url;

/// An inbound request, immutable once received
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    headers: HeaderMap,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// A plain GET request
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Only GET is a read method; everything else mutates or is uncacheable
    pub fn is_read(&self) -> bool {
        self.method == Method::GET
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Lowercased file extension of the last path segment, if any
    pub fn extension(&self) -> Option<String> {
        let segment = self.url.path_segments()?.next_back()?;
        let (stem, ext) = segment.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Whether the Accept header asks for HTML
    pub fn accepts_html(&self) -> bool {
        self.headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }
}

/// Origin class of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseKind {
    /// Same-origin response
    Basic,
    /// Cross-origin response
    Cors,
    /// Network error surfaced as a response object
    Error,
}

/// A response from the network, a store, or synthesized by the router
///
/// The body is an immutable [`Bytes`] buffer, so cloning produces an
/// independent snapshot that can be stored while the original is returned.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    kind: ResponseKind,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// 200 response with the given body
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), body)
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Synthesized JSON error: `{"error": "<message>"}`
    pub fn json_error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status, HeaderMap::new(), body)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
    }

    /// Synthesized plain 503 used when neither network nor stores can answer
    pub fn offline() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, HeaderMap::new(), "Offline")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_error_kind(&self) -> bool {
        self.kind == ResponseKind::Error
    }

    /// Only plain 200 responses are ever written to a store
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && !self.is_error_kind()
    }

    /// Independent copy for storage
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
