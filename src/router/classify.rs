//! Request Classifier
//!
//! Pure, ordered classification of an inbound request. The first matching
//! rule wins:
//!
//! 1. non-read method -> [`RequestClass::Bypass`]
//! 2. non-http scheme -> [`RequestClass::Ignore`]
//! 3. auth route -> [`RequestClass::Auth`]
//! 4. API prefix -> [`RequestClass::Api`]
//! 5. asset extension -> [`RequestClass::Static`]
//! 6. anything else -> [`RequestClass::Generic`]
//!
//! Auth is checked before the API prefix so that credential-bearing routes
//! under `/api/` never receive a synthesized fallback.

use std::collections::HashSet;
use std::fmt;

use crate::config::{PathPattern, RouterConfig};
use crate::net::RequestDescriptor;

/// Class assigned to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    Bypass,
    Ignore,
    Auth,
    Api,
    Static,
    Generic,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Bypass => "bypass",
            RequestClass::Ignore => "ignore",
            RequestClass::Auth => "auth",
            RequestClass::Api => "api",
            RequestClass::Static => "static",
            RequestClass::Generic => "generic",
        }
    }

    /// Whether requests of this class may read from or write to a store
    pub fn touches_stores(&self) -> bool {
        matches!(self, RequestClass::Static | RequestClass::Generic)
    }
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification rules extracted from the router configuration
#[derive(Debug, Clone)]
pub struct Classifier {
    auth_patterns: Vec<PathPattern>,
    api_prefix: String,
    static_extensions: HashSet<String>,
}

impl Classifier {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            auth_patterns: config.auth_patterns.clone(),
            api_prefix: config.api_prefix.clone(),
            static_extensions: config
                .static_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn classify(&self, request: &RequestDescriptor) -> RequestClass {
        if !request.is_read() {
            return RequestClass::Bypass;
        }
        if !request.is_http() {
            return RequestClass::Ignore;
        }

        let path = request.path();
        if self.auth_patterns.iter().any(|p| p.matches(path)) {
            return RequestClass::Auth;
        }
        if path.starts_with(self.api_prefix.as_str()) {
            return RequestClass::Api;
        }
        match request.extension() {
            Some(ext) if self.static_extensions.contains(&ext) => RequestClass::Static,
            _ => RequestClass::Generic,
        }
    }
}
