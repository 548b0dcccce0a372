//! Error types for the sync pipeline.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::storage::StorageError;

/// A single image could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("no image URL")]
    MissingUrl,
    #[error("empty response body")]
    EmptyBody,
}

/// Fetched or cached bytes could not be persisted.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{0}")]
    InvalidName(#[source] StorageError),
    #[error("failed to write {path}: {source}")]
    LocalWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read cached {path}: {source}")]
    LocalRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {container}/{name} failed: {source}")]
    Upload {
        container: &'static str,
        name: String,
        #[source]
        source: StorageError,
    },
}

/// Run-level failures. Per-asset errors never surface here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[from] CatalogError),
    #[error("sync failed: {0}")]
    Unexpected(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Unexpected(e.to_string())
    }
}
