//! Cache Storage Error Types

/// Failures of the cache storage backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Cache storage unavailable: {0}")]
    Unavailable(String),

    #[error("Entry rejected: {0}")]
    Rejected(String),
}
