//! IPC protocol definitions for host-router communication
//!
//! Newline-delimited JSON over a Unix domain socket. Each command maps to
//! one router event; bodies travel base64-encoded.

use std::env;
use std::path::PathBuf;

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::net::Response as RoutedResponse;
use crate::lifecycle::WorkerState;
use crate::worker::ClientReply;

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Socket file name inside the runtime directory
pub const SOCKET_NAME: &str = "swiftsync-router.sock";

/// Environment variable overriding the socket path
pub const SOCKET_ENV: &str = "SWIFTSYNC_SOCKET";

/// Socket path for IPC communication
pub fn socket_path() -> PathBuf {
    match env::var_os(SOCKET_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => dirs::runtime_dir()
            .unwrap_or_else(env::temp_dir)
            .join(SOCKET_NAME),
    }
}

/// Header fields in wire order; a repeated header appears once per value
pub type WireHeaders = Vec<(String, String)>;

/// Header values decode as UTF-8, falling back to one char per byte
fn header_text(value: &HeaderValue) -> String {
    match std::str::from_utf8(value.as_bytes()) {
        Ok(text) => text.to_string(),
        Err(_) => value.as_bytes().iter().map(|&b| char::from(b)).collect(),
    }
}

/// Every field of a header map, repeats included
pub fn wire_headers(headers: &HeaderMap) -> WireHeaders {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), header_text(value)))
        .collect()
}

/// Commands sent from the host to the router daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Deliver the install event
    Install,
    /// Deliver the activate event
    Activate,
    /// Route a request
    Fetch {
        #[serde(default = "default_method")]
        method: String,
        url: String,
        #[serde(default)]
        headers: WireHeaders,
    },
    /// Post a client message
    Message { payload: serde_json::Value },
    /// Background sync
    Sync { tag: String },
    /// Push message with an optional text payload
    Push {
        #[serde(default)]
        payload: Option<String>,
    },
    /// Notification click
    NotificationClick {
        tag: String,
        #[serde(default)]
        action: Option<String>,
    },
    /// Install and activate a new cache generation, retiring the current one
    Upgrade { version: String },
    /// Get daemon status and list of stores
    GetStatus,
}

fn default_method() -> String {
    "GET".to_string()
}

/// Responses sent from the router daemon to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Success response
    Success {
        /// Optional success message
        message: Option<String>,
    },
    /// Error response
    Error {
        /// Error message
        error: String,
    },
    /// The router answered a fetch
    Fetched {
        /// Where the answer came from: network, cache or fallback
        source: String,
        status: u16,
        headers: WireHeaders,
        /// Base64-encoded body
        body: String,
    },
    /// The router declined a fetch; the host should use its default
    Declined,
    /// Reply a message handler sent on its reply port
    Reply { reply: ClientReply },
    /// Background sync result
    Synced { ok: Option<bool> },
    /// Status response with router state
    #[serde(rename_all = "camelCase")]
    Status {
        /// Protocol version
        version: u32,
        /// Whether daemon is healthy
        healthy: bool,
        /// Cache generation tag
        cache_version: String,
        state: WorkerState,
        caches: Vec<String>,
    },
}

impl Response {
    /// Wire form of a routed response
    pub fn fetched(source: &str, response: &RoutedResponse) -> Self {
        Response::Fetched {
            source: source.to_string(),
            status: response.status().as_u16(),
            headers: wire_headers(response.headers()),
            body: base64::engine::general_purpose::STANDARD.encode(response.body()),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Response::Error {
            error: error.into(),
        }
    }
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n');
    Ok(json)
}
