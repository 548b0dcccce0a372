//! Durable blob storage for synchronized images.
//!
//! Backends are swappable behind [`DurableStore`]:
//! - Azure Blob Storage over its REST API (production)
//! - A directory per container on the local filesystem
//! - In-memory, with an operation log for tests

mod azure;
mod fs;
mod memory;

use std::collections::HashSet;

use async_trait::async_trait;
use bytes::Bytes;

pub use azure::{AzureBlobStore, AzureConnection};
pub use fs::FsBlobStore;
pub(crate) use fs::{list_files, write_atomic};
pub use memory::{MemoryBlobStore, StoreOp};

/// Content type attached to every uploaded image.
pub const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from durable store backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} returned HTTP {status}")]
    Status { operation: &'static str, status: u16 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid blob or container name: {0}")]
    InvalidName(String),
    #[error("Malformed listing response: {0}")]
    MalformedListing(String),
    #[error("Storage configuration error: {0}")]
    Config(String),
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// A key/blob store grouped into containers.
///
/// Implementations must be safe to call concurrently. `upload` overwrites an
/// existing blob of the same name and creates the container if needed.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Names of blobs in `container` starting with `prefix`.
    ///
    /// A container that does not exist yet is reported as empty.
    async fn existing_blobs(&self, container: &str, prefix: &str)
        -> StorageResult<HashSet<String>>;

    async fn exists(&self, container: &str, name: &str) -> StorageResult<bool>;

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Reject names that could escape a container or break URL paths.
pub(crate) fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
