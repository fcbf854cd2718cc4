//! Router configuration
//!
//! Build-time constants for the SwiftSync deployment, bundled into an
//! immutable [`RouterConfig`] that is handed to the router at construction.

use url::Url;

/// Naming prefix shared by every store this router owns
pub const CACHE_PREFIX: &str = "swiftsync-";

/// Current deployment generation
pub const CACHE_VERSION: &str = "v1.0.0";

/// Origin used when `SWIFTSYNC_ORIGIN` is not set
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8000";

/// Description carried in the JSON body of an offline API response
pub const API_OFFLINE_MESSAGE: &str = "Offline - API unavailable";

/// Core assets cached on install
const CORE_ASSETS: &[&str] = &[
    "/",
    "/manifest.json",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css",
    "https://fonts.googleapis.com/css2?family=Inter:wght@300;400;500;600;700;900&display=swap",
];

/// Style sheets, scripts, fonts and images
const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "woff", "woff2", "ttf", "otf", "eot", "png", "jpg", "jpeg", "gif",
    "svg", "webp", "ico",
];

/// How an auth route pattern is matched against a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Path starts with the value
    Prefix(String),
    /// Path contains the value anywhere
    Substring(String),
}

impl PathPattern {
    pub fn prefix(value: impl Into<String>) -> Self {
        PathPattern::Prefix(value.into())
    }

    pub fn substring(value: impl Into<String>) -> Self {
        PathPattern::Substring(value.into())
    }

    /// Check whether a request path matches this pattern
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Prefix(p) => path.starts_with(p.as_str()),
            PathPattern::Substring(s) => path.contains(s.as_str()),
        }
    }
}

/// Presentation of push notifications
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub title: String,
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub open_title: String,
    pub close_title: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "SwiftSync".to_string(),
            default_body: "New update available".to_string(),
            icon: "/static/icons/icon-192x192.png".to_string(),
            badge: "/static/icons/icon-72x72.png".to_string(),
            vibrate: vec![200, 100, 200],
            open_title: "Open SwiftSync".to_string(),
            close_title: "Close".to_string(),
        }
    }
}

/// Immutable router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origin the router is scoped to; relative paths resolve against it
    pub origin: Url,
    /// Prefix carried by every store name
    pub cache_prefix: String,
    /// Version tag of the current generation
    pub version: String,
    /// Manifest cached into the precache store on install
    pub core_assets: Vec<String>,
    /// Auth-sensitive routes, never cached
    pub auth_patterns: Vec<PathPattern>,
    /// Path prefix of the API namespace
    pub api_prefix: String,
    /// Lowercase file extensions (no dot) served cache-first
    pub static_extensions: Vec<String>,
    /// Document served to offline HTML navigations
    pub root_document: String,
    /// Background sync tag and the endpoint it invokes
    pub sync_tag: String,
    pub sync_endpoint: String,
    pub notification: NotificationConfig,
}

impl RouterConfig {
    /// SwiftSync configuration scoped to [`DEFAULT_ORIGIN`]
    pub fn new() -> Result<Self, url::ParseError> {
        Ok(Self::for_origin(Url::parse(DEFAULT_ORIGIN)?))
    }

    /// Build the SwiftSync configuration scoped to an origin
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            cache_prefix: CACHE_PREFIX.to_string(),
            version: CACHE_VERSION.to_string(),
            core_assets: CORE_ASSETS.iter().map(|s| s.to_string()).collect(),
            auth_patterns: vec![
                PathPattern::prefix("/login"),
                PathPattern::prefix("/logout"),
                PathPattern::prefix("/account/login"),
                PathPattern::prefix("/api/attendance/login"),
                PathPattern::substring("/auth/"),
                PathPattern::substring("check-credentials"),
            ],
            api_prefix: "/api/".to_string(),
            static_extensions: STATIC_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            root_document: "/".to_string(),
            sync_tag: "sync-lectures".to_string(),
            sync_endpoint: "/api/sync-now".to_string(),
            notification: NotificationConfig::default(),
        }
    }

    /// Read deployment parameters from the environment
    ///
    /// Only the origin is taken from `SWIFTSYNC_ORIGIN`; everything else is
    /// fixed at build time.
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;

        let origin = std::env::var("SWIFTSYNC_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
        let origin = Url::parse(&origin)
            .with_context(|| format!("Invalid SWIFTSYNC_ORIGIN: {}", origin))?;
        Ok(Self::for_origin(origin))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_core_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth_patterns(mut self, patterns: Vec<PathPattern>) -> Self {
        self.auth_patterns = patterns;
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Name of the precache store for the current generation
    pub fn precache_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.version)
    }

    /// Name of the runtime store (shared across generations)
    pub fn runtime_name(&self) -> String {
        format!("{}runtime", self.cache_prefix)
    }

    /// Whether a store name belongs to this system
    pub fn owns_store(&self, name: &str) -> bool {
        name.starts_with(self.cache_prefix.as_str())
    }

    /// Whether a store name belongs to a stale generation
    pub fn is_stale_store(&self, name: &str) -> bool {
        self.owns_store(name) && name != self.precache_name() && name != self.runtime_name()
    }

    /// Resolve a manifest entry or endpoint path against the origin
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.origin.join(path)
    }

    /// URL of the root document
    pub fn root_url(&self) -> Result<Url, url::ParseError> {
        self.resolve(&self.root_document)
    }

    /// Whether a URL shares the configured origin
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }
}
