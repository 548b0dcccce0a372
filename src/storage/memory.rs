//! In-memory durable store with an operation log.
//!
//! State is not persisted. Failures can be injected per blob name or for
//! listing, which makes this backend the workhorse of pipeline tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{validate_name, DurableStore, StorageError, StorageResult};

/// Record of a store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List { container: String, prefix: String },
    Exists { container: String, name: String },
    Upload { container: String, name: String, size: usize },
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
}

#[derive(Debug, Default)]
struct Inner {
    containers: HashMap<String, HashMap<String, StoredBlob>>,
    operations: Vec<StoreOp>,
    fail_listing: bool,
    fail_uploads: HashSet<String>,
}

/// Durable store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
    latency: Option<Duration>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that sleeps for `latency` inside each upload.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Seed a blob without recording an operation.
    pub async fn insert(&self, container: &str, name: &str, data: impl Into<Bytes>) {
        let mut inner = self.inner.write().await;
        inner.containers.entry(container.to_string()).or_default().insert(
            name.to_string(),
            StoredBlob {
                data: data.into(),
                content_type: super::IMAGE_CONTENT_TYPE.to_string(),
            },
        );
    }

    /// Make every listing fail.
    pub async fn fail_listing(&self, fail: bool) {
        self.inner.write().await.fail_listing = fail;
    }

    /// Make uploads of `name` fail (in any container).
    pub async fn fail_upload(&self, name: &str) {
        self.inner.write().await.fail_uploads.insert(name.to_string());
    }

    pub async fn operations(&self) -> Vec<StoreOp> {
        self.inner.read().await.operations.clone()
    }

    /// Number of uploads recorded for `name` in `container`.
    pub async fn upload_count(&self, container: &str, name: &str) -> usize {
        self.inner
            .read()
            .await
            .operations
            .iter()
            .filter(|op| {
                matches!(op, StoreOp::Upload { container: c, name: n, .. } if c == container && n == name)
            })
            .count()
    }

    pub async fn get(&self, container: &str, name: &str) -> Option<Bytes> {
        self.inner
            .read()
            .await
            .containers
            .get(container)
            .and_then(|blobs| blobs.get(name))
            .map(|blob| blob.data.clone())
    }

    pub async fn content_type(&self, container: &str, name: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .containers
            .get(container)
            .and_then(|blobs| blobs.get(name))
            .map(|blob| blob.content_type.clone())
    }

    /// Sorted `(name, data)` pairs in a container, for state comparisons.
    pub async fn snapshot(&self, container: &str) -> Vec<(String, Bytes)> {
        let inner = self.inner.read().await;
        let mut blobs: Vec<(String, Bytes)> = inner
            .containers
            .get(container)
            .map(|blobs| {
                blobs
                    .iter()
                    .map(|(name, blob)| (name.clone(), blob.data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        blobs.sort_by(|a, b| a.0.cmp(&b.0));
        blobs
    }
}

#[async_trait]
impl DurableStore for MemoryBlobStore {
    async fn existing_blobs(
        &self,
        container: &str,
        prefix: &str,
    ) -> StorageResult<HashSet<String>> {
        let mut inner = self.inner.write().await;
        inner.operations.push(StoreOp::List {
            container: container.to_string(),
            prefix: prefix.to_string(),
        });
        if inner.fail_listing {
            return Err(StorageError::Injected(format!("list {}", container)));
        }
        Ok(inner
            .containers
            .get(container)
            .map(|blobs| {
                blobs
                    .keys()
                    .filter(|name| name.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        inner.operations.push(StoreOp::Exists {
            container: container.to_string(),
            name: name.to_string(),
        });
        Ok(inner
            .containers
            .get(container)
            .is_some_and(|blobs| blobs.contains_key(name)))
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        validate_name(name)?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.inner.write().await;
        inner.operations.push(StoreOp::Upload {
            container: container.to_string(),
            name: name.to_string(),
            size: data.len(),
        });
        if inner.fail_uploads.contains(name) {
            return Err(StorageError::Injected(format!("upload {}", name)));
        }
        inner.containers.entry(container.to_string()).or_default().insert(
            name.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}
