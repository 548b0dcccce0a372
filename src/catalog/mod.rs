//! Source of title and achievement records.
//!
//! The ingestion side owns these records; the sync pipeline only reads a
//! snapshot of them at the start of each run.

mod json;
mod memory;

use async_trait::async_trait;

use crate::models::{Achievement, Title};

pub use json::JsonCatalog;
pub use memory::StaticCatalog;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors from catalog backends.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the current set of records whose images should be synchronized.
#[async_trait]
pub trait AssetSourceCatalog: Send + Sync {
    async fn list_titles(&self) -> CatalogResult<Vec<Title>>;

    async fn list_achievements(&self) -> CatalogResult<Vec<Achievement>>;
}
