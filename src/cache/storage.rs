//! Cache Storage
//!
//! Opens, enumerates and deletes named cache stores, and looks requests up
//! across them. [`MemoryCacheStorage`] keeps stores in creation order so the
//! combined lookup consults the precache store before the runtime store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::errors::StorageError;
use super::store::CacheStore;
use crate::net::{RequestDescriptor, Response};

/// Which stores a lookup consults
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// Every store, in creation order
    All,
    /// A single store by name
    Named(String),
}

/// Named cache store container
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a store, creating it if absent
    async fn open(&self, name: &str) -> Result<CacheStore, StorageError>;

    /// Names of all stores
    async fn list_all(&self) -> Result<Vec<String>, StorageError>;

    /// Delete a store; false if it did not exist
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// First matching response across the scoped stores
    async fn lookup(
        &self,
        scope: &StoreScope,
        request: &RequestDescriptor,
    ) -> Result<Option<Response>, StorageError>;

    /// Write a response into a store, opening it if needed
    async fn put(
        &self,
        store: &str,
        request: &RequestDescriptor,
        response: Response,
    ) -> Result<(), StorageError> {
        self.open(store).await?.put(request, response)
    }
}

/// In-process cache storage
#[derive(Default)]
pub struct MemoryCacheStorage {
    stores: RwLock<Vec<CacheStore>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to an existing store without creating it
    pub async fn get(&self, name: &str) -> Option<CacheStore> {
        let stores = self.stores.read().await;
        stores.iter().find(|s| s.name() == name).cloned()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<CacheStore, StorageError> {
        if let Some(store) = self.get(name).await {
            return Ok(store);
        }

        let mut stores = self.stores.write().await;
        // Another task may have created it between the two locks
        if let Some(store) = stores.iter().find(|s| s.name() == name) {
            return Ok(store.clone());
        }

        let store = CacheStore::new(name);
        stores.push(store.clone());
        info!(store = name, "Created cache store");
        Ok(store)
    }

    async fn list_all(&self) -> Result<Vec<String>, StorageError> {
        let stores = self.stores.read().await;
        Ok(stores.iter().map(|s| s.name().to_string()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut stores = self.stores.write().await;
        let before = stores.len();
        stores.retain(|s| s.name() != name);
        let deleted = stores.len() != before;
        if deleted {
            info!(store = name, "Deleted cache store");
        }
        Ok(deleted)
    }

    async fn lookup(
        &self,
        scope: &StoreScope,
        request: &RequestDescriptor,
    ) -> Result<Option<Response>, StorageError> {
        let stores = self.stores.read().await;
        let found = match scope {
            StoreScope::All => stores.iter().find_map(|s| s.lookup(request)),
            StoreScope::Named(name) => stores
                .iter()
                .find(|s| s.name() == name)
                .and_then(|s| s.lookup(request)),
        };
        if found.is_none() {
            debug!(url = %request.url(), scope = ?scope, "No stored response");
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn get(url: &str) -> RequestDescriptor {
        RequestDescriptor::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_open_is_create_if_absent() {
        let storage = MemoryCacheStorage::new();
        let a = storage.open("swiftsync-v1.0.0").await.unwrap();
        a.put(&get("http://localhost/"), Response::ok("root")).unwrap();

        // Reopening yields the same store
        let b = storage.open("swiftsync-v1.0.0").await.unwrap();
        assert!(b.lookup(&get("http://localhost/")).is_some());
        assert_eq!(storage.list_all().await.unwrap(), vec!["swiftsync-v1.0.0"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryCacheStorage::new();
        storage.open("a").await.unwrap();
        storage.open("b").await.unwrap();

        assert!(storage.delete("a").await.unwrap());
        assert!(!storage.delete("a").await.unwrap());
        assert_eq!(storage.list_all().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_lookup_scopes() {
        let storage = MemoryCacheStorage::new();
        let req = get("http://localhost/app.js");
        storage.put("first", &req, Response::ok("precached")).await.unwrap();
        storage.put("second", &req, Response::ok("runtime")).await.unwrap();

        let all = storage.lookup(&StoreScope::All, &req).await.unwrap().unwrap();
        assert_eq!(all.text(), "precached");

        let named = storage
            .lookup(&StoreScope::Named("second".to_string()), &req)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(named.text(), "runtime");

        let missing = storage
            .lookup(&StoreScope::Named("third".to_string()), &req)
            .await
            .unwrap();
        assert!(missing.is_none());
        // Looking up a missing store does not create it
        assert_eq!(storage.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deleted_store_contents_gone() {
        let storage = MemoryCacheStorage::new();
        let req = get("http://localhost/");
        storage.put("old", &req, Response::ok("stale")).await.unwrap();
        storage.delete("old").await.unwrap();

        assert!(storage.lookup(&StoreScope::All, &req).await.unwrap().is_none());
        let reopened = storage.open("old").await.unwrap();
        assert!(reopened.is_empty());
    }
}
