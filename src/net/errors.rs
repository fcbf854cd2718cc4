//! Network Error Types
//!
//! Every variant is a single failure mode to the strategy executor: the fetch
//! did not produce a response.

/// Network failure while fetching a request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection aborted: {0}")]
    Aborted(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl NetworkError {
    /// Map a reqwest error onto the failure taxonomy
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_connect() {
            NetworkError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            NetworkError::Aborted(err.to_string())
        } else {
            NetworkError::Request(err.to_string())
        }
    }
}
