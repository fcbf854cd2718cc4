//! Test doubles for the router's seams
//!
//! - [`MockFetcher`]: scripted per-URL responses, offline switch, call log
//! - [`RecordingHost`]: records notifications, windows and client claims
//! - [`FlakyStorage`]: memory storage that fails opens, reads, writes or deletes on demand

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use url::Url;

use crate::cache::{CacheStorage, CacheStore, MemoryCacheStorage, StorageError, StoreScope};
use crate::host::{ClientHost, HostError};
use crate::net::{FetchOptions, Fetcher, NetworkError, RequestDescriptor, Response};
use crate::notify::NotificationOptions;

/// Fetcher answering from a table of canned responses
///
/// Unknown URLs answer 404. While offline, or for URLs marked with
/// [`MockFetcher::fail`], every call fails with `Connect("offline")`.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(RequestDescriptor, FetchOptions)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r.url().as_str() == url)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<(RequestDescriptor, FetchOptions)> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(
        &self,
        request: &RequestDescriptor,
        options: FetchOptions,
    ) -> Result<Response, NetworkError> {
        self.calls.lock().unwrap().push((request.clone(), options));

        let url = request.url().as_str();
        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(url) {
            return Err(NetworkError::Connect("offline".to_string()));
        }
        let response = self.routes.lock().unwrap().get(url).cloned();
        Ok(response.unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND, HeaderMap::new(), "")))
    }
}

/// Host that records every request made of it
pub struct RecordingHost {
    clients: usize,
    claim_delay: Option<Duration>,
    claims: AtomicUsize,
    notifications: Mutex<Vec<(String, NotificationOptions)>>,
    closed: Mutex<Vec<String>>,
    windows: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            clients: 2,
            claim_delay: None,
            claims: AtomicUsize::new(0),
            notifications: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// Make every claim take a while, so concurrent callers overlap
    pub fn with_claim_delay(mut self, delay: Duration) -> Self {
        self.claim_delay = Some(delay);
        self
    }

    /// Number of clients a claim takes over
    pub fn client_count(&self) -> usize {
        self.clients
    }

    pub fn claim_count(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<(String, NotificationOptions)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    pub fn opened_windows(&self) -> Vec<String> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientHost for RecordingHost {
    async fn claim_clients(&self) -> Result<usize, HostError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.claim_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.clients)
    }

    async fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<(), HostError> {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), options.clone()));
        Ok(())
    }

    async fn close_notification(&self, tag: &str) -> Result<(), HostError> {
        self.closed.lock().unwrap().push(tag.to_string());
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> Result<(), HostError> {
        self.windows.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Memory storage with switchable failures
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryCacheStorage,
    fail_opens: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryCacheStorage {
        &self.inner
    }

    pub fn fail_opens(&self, fail: bool) {
        self.fail_opens.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> StorageError {
        StorageError::Unavailable("injected failure".to_string())
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<CacheStore, StorageError> {
        if self.fail_opens.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.open(name).await
    }

    async fn list_all(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list_all().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.delete(name).await
    }

    async fn lookup(
        &self,
        scope: &StoreScope,
        request: &RequestDescriptor,
    ) -> Result<Option<Response>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.lookup(scope, request).await
    }

    async fn put(
        &self,
        store: &str,
        request: &RequestDescriptor,
        response: Response,
    ) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.put(store, request, response).await
    }
}
