//! Cache Store Manager
//!
//! Named cache stores holding request -> response entries, and the storage
//! that opens, enumerates and deletes them by name.

pub mod errors;
pub mod storage;
pub mod store;

pub use errors::StorageError;
pub use storage::{CacheStorage, MemoryCacheStorage, StoreScope};
pub use store::{CacheKey, CacheStore};
