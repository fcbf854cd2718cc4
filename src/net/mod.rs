//! Network side of the router: request/response types and the fetcher seam

pub mod errors;
pub mod fetcher;
pub mod types;

pub use errors::NetworkError;
pub use fetcher::{Credentials, FetchOptions, Fetcher, HttpFetcher};
pub use types::{RequestDescriptor, Response, ResponseKind};
