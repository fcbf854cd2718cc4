//! Cache Store Implementation
//!
//! A single named store backed by Moka. Entries are keyed by method and URL
//! and additionally matched on the request headers named by the stored
//! response's `Vary` header. Entries never expire; a store is replaced
//! wholesale by deleting it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use moka::sync::Cache;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, VARY};
use reqwest::Method;
use tracing::{debug, trace};

use super::errors::StorageError;
use crate::net::{RequestDescriptor, Response};

/// Request identity within a store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    /// Key for a request; the URL fragment is not part of the identity
    pub fn for_request(request: &RequestDescriptor) -> Self {
        let mut url = request.url().clone();
        url.set_fragment(None);
        Self {
            method: request.method().clone(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Stored response plus the request header values it varies on
#[derive(Debug)]
struct CachedEntry {
    vary: Vec<(HeaderName, Option<HeaderValue>)>,
    response: Response,
    cached_at: Instant,
}

impl CachedEntry {
    fn matches(&self, headers: &HeaderMap) -> bool {
        self.vary
            .iter()
            .all(|(name, value)| headers.get(name) == value.as_ref())
    }
}

/// Header names listed in a response's `Vary`; `None` for `Vary: *`
fn vary_names(response: &Response) -> Option<Vec<HeaderName>> {
    let mut names = Vec::new();
    for value in response.headers().get_all(VARY) {
        let Ok(value) = value.to_str() else { continue };
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part == "*" {
                return None;
            }
            if let Ok(name) = HeaderName::from_bytes(part.as_bytes()) {
                names.push(name);
            }
        }
    }
    Some(names)
}

/// A named key-value container of responses
#[derive(Clone)]
pub struct CacheStore {
    name: Arc<str>,
    entries: Cache<CacheKey, Arc<CachedEntry>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheStore {
    pub fn new(name: &str) -> Self {
        let entries = Cache::builder().name(name).build();
        Self {
            name: Arc::from(name),
            entries,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a request, returning a snapshot of the stored response
    pub fn lookup(&self, request: &RequestDescriptor) -> Option<Response> {
        let key = CacheKey::for_request(request);
        match self.entries.get(&key) {
            Some(entry) if entry.matches(request.headers()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(
                    store = %self.name,
                    url = key.url(),
                    age_ms = entry.cached_at.elapsed().as_millis() as u64,
                    "Cache HIT"
                );
                Some(entry.response.snapshot())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(store = %self.name, url = key.url(), "Cache MISS");
                None
            }
        }
    }

    /// Store a response for a request, replacing any previous entry
    pub fn put(&self, request: &RequestDescriptor, response: Response) -> Result<(), StorageError> {
        if *request.method() != Method::GET {
            return Err(StorageError::Rejected(format!(
                "{} requests cannot be stored",
                request.method()
            )));
        }
        let names = vary_names(&response)
            .ok_or_else(|| StorageError::Rejected("response varies on '*'".to_string()))?;

        let vary = names
            .into_iter()
            .map(|name| {
                let value = request.headers().get(&name).cloned();
                (name, value)
            })
            .collect();

        let key = CacheKey::for_request(request);
        debug!(
            store = %self.name,
            url = key.url(),
            status = response.status().as_u16(),
            size = response.body().len(),
            "Stored response"
        );
        self.entries.insert(
            key,
            Arc::new(CachedEntry {
                vary,
                response,
                cached_at: Instant::now(),
            }),
        );
        Ok(())
    }

    /// Remove the entry for a request
    pub fn delete(&self, request: &RequestDescriptor) -> bool {
        let key = CacheKey::for_request(request);
        self.entries.remove(&key).is_some()
    }

    pub fn contains(&self, request: &RequestDescriptor) -> bool {
        self.entries.contains_key(&CacheKey::for_request(request))
    }

    /// URLs of all stored entries
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.iter().map(|(k, _)| k.url.clone()).collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.name)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
