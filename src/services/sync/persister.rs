//! Writes asset bytes to the local cache and the durable store.

use std::sync::Arc;

use bytes::Bytes;

use super::error::PersistError;
use crate::models::AssetDescriptor;
use crate::storage::{validate_name, write_atomic, DurableStore, IMAGE_CONTENT_TYPE};

/// Persists one asset at a time; safe to share between units.
#[derive(Clone)]
pub struct AssetPersister {
    store: Option<Arc<dyn DurableStore>>,
    write_local: bool,
}

impl AssetPersister {
    pub fn new(store: Option<Arc<dyn DurableStore>>, write_local: bool) -> Self {
        Self { store, write_local }
    }

    /// Write `data` to the local cache (when enabled), then upload it.
    ///
    /// Uploads overwrite, so persisting the same asset twice is harmless.
    pub async fn persist(
        &self,
        descriptor: &AssetDescriptor,
        data: Bytes,
    ) -> Result<(), PersistError> {
        validate_name(&descriptor.blob_name).map_err(PersistError::InvalidName)?;
        if self.write_local {
            write_atomic(&descriptor.local_path, &data)
                .await
                .map_err(|e| PersistError::LocalWrite {
                    path: descriptor.local_path.display().to_string(),
                    source: e,
                })?;
        }

        self.upload(descriptor, data).await
    }

    /// Upload the local cache file for `descriptor` without fetching it.
    pub async fn restore_from_cache(&self, descriptor: &AssetDescriptor) -> Result<(), PersistError> {
        validate_name(&descriptor.blob_name).map_err(PersistError::InvalidName)?;
        let data = tokio::fs::read(&descriptor.local_path)
            .await
            .map_err(|e| PersistError::LocalRead {
                path: descriptor.local_path.display().to_string(),
                source: e,
            })?;

        self.upload(descriptor, Bytes::from(data)).await
    }

    async fn upload(&self, descriptor: &AssetDescriptor, data: Bytes) -> Result<(), PersistError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let container = descriptor.kind.container();
        store
            .upload(container, &descriptor.blob_name, data, IMAGE_CONTENT_TYPE)
            .await
            .map_err(|e| PersistError::Upload {
                container,
                name: descriptor.blob_name.clone(),
                source: e,
            })?;

        tracing::debug!("Uploaded blob {} to container {}", descriptor.blob_name, container);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetKind;
    use crate::storage::MemoryBlobStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_writes_cache_and_uploads() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let persister = AssetPersister::new(Some(store.clone()), true);
        let d = AssetDescriptor::new(AssetKind::Title, "7".into(), "http://x".into(), dir.path());

        persister
            .persist(&d, Bytes::from_static(b"png"))
            .await
            .unwrap();

        assert_eq!(std::fs::read(dir.path().join("titles/7.png")).unwrap(), b"png");
        assert_eq!(
            store.get("titles", "7.png").await,
            Some(Bytes::from_static(b"png"))
        );
        assert_eq!(
            store.content_type("titles", "7.png").await.as_deref(),
            Some("image/png")
        );
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        store.fail_upload("7.png").await;
        let persister = AssetPersister::new(Some(store.clone()), false);
        let d = AssetDescriptor::new(AssetKind::Title, "7".into(), "http://x".into(), dir.path());

        let err = persister
            .persist(&d, Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Upload { container: "titles", .. }));
        assert!(!dir.path().join("titles/7.png").exists());
    }

    #[tokio::test]
    async fn test_restore_from_cache() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("achievements")).unwrap();
        std::fs::write(dir.path().join("achievements/1.2.png"), b"cached").unwrap();
        let store = Arc::new(MemoryBlobStore::new());
        let persister = AssetPersister::new(Some(store.clone()), true);
        let d = AssetDescriptor::new(
            AssetKind::Achievement,
            "1.2".into(),
            String::new(),
            dir.path(),
        );

        persister.restore_from_cache(&d).await.unwrap();
        assert_eq!(
            store.get("achievements", "1.2.png").await,
            Some(Bytes::from_static(b"cached"))
        );
    }

    #[tokio::test]
    async fn test_local_write_failure_is_reported() {
        let dir = tempdir().unwrap();
        // A file where the kind directory should be.
        std::fs::write(dir.path().join("titles"), b"").unwrap();
        let persister = AssetPersister::new(None, true);
        let d = AssetDescriptor::new(AssetKind::Title, "7".into(), "http://x".into(), dir.path());

        let err = persister
            .persist(&d, Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::LocalWrite { .. }));
    }

    #[tokio::test]
    async fn test_traversal_key_is_not_written() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = Arc::new(MemoryBlobStore::new());
        let persister = AssetPersister::new(Some(store.clone()), true);
        let d = AssetDescriptor::new(
            AssetKind::Achievement,
            "1.x/../../../escaped".into(),
            "http://x".into(),
            &data_dir,
        );

        let err = persister
            .persist(&d, Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::InvalidName(_)));
        assert!(!dir.path().join("escaped.png").exists());
        assert!(store.operations().await.is_empty());
    }
}
