//! Filesystem-backed durable store: one directory per container.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{validate_name, DurableStore, StorageResult};

/// Suffix of in-progress writes; never reported as blobs.
const TEMP_SUFFIX: &str = ".partial";

/// Stores blobs as `{root}/{container}/{name}`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn container_dir(&self, container: &str) -> StorageResult<PathBuf> {
        validate_name(container)?;
        Ok(self.root.join(container))
    }
}

/// Write `data` to `path` via a temp file and rename, so readers never see
/// a partially written blob.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(
        ".{}.{}{}",
        file_name,
        uuid::Uuid::new_v4().simple(),
        TEMP_SUFFIX
    ));

    tokio::fs::write(&tmp_path, data).await?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// List regular file names in `dir` starting with `prefix`.
///
/// A missing directory yields an empty set.
pub(crate) async fn list_files(dir: &Path, prefix: &str) -> std::io::Result<HashSet<String>> {
    let mut names = HashSet::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(TEMP_SUFFIX) || !name.starts_with(prefix) {
            continue;
        }
        names.insert(name);
    }

    Ok(names)
}

#[async_trait]
impl DurableStore for FsBlobStore {
    async fn existing_blobs(
        &self,
        container: &str,
        prefix: &str,
    ) -> StorageResult<HashSet<String>> {
        let dir = self.container_dir(container)?;
        if !tokio::fs::try_exists(&dir).await? {
            tracing::info!("Container {} does not exist yet", dir.display());
        }
        Ok(list_files(&dir, prefix).await?)
    }

    async fn exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        validate_name(name)?;
        let path = self.container_dir(container)?.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        validate_name(name)?;
        let path = self.container_dir(container)?.join(name);
        write_atomic(&path, &data).await?;
        tracing::debug!("Uploaded blob {} to container {}", name, container);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_container_lists_empty() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        let names = store.existing_blobs("titles", "").await.unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_upload_then_list_and_exists() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());

        store
            .upload("titles", "1.png", Bytes::from_static(b"one"), "image/png")
            .await
            .unwrap();
        store
            .upload("titles", "2.png", Bytes::from_static(b"two"), "image/png")
            .await
            .unwrap();

        let all = store.existing_blobs("titles", "").await.unwrap();
        assert_eq!(all.len(), 2);
        let prefixed = store.existing_blobs("titles", "2").await.unwrap();
        assert_eq!(prefixed, HashSet::from(["2.png".to_string()]));

        assert!(store.exists("titles", "1.png").await.unwrap());
        assert!(!store.exists("titles", "3.png").await.unwrap());
        assert!(!store.exists("achievements", "1.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());

        for _ in 0..2 {
            store
                .upload("titles", "1.png", Bytes::from_static(b"same"), "image/png")
                .await
                .unwrap();
        }

        let names = store.existing_blobs("titles", "").await.unwrap();
        assert_eq!(names.len(), 1);
        let saved = std::fs::read(dir.path().join("titles").join("1.png")).unwrap();
        assert_eq!(saved, b"same");
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().to_path_buf());
        let err = store
            .upload("titles", "../x.png", Bytes::new(), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, super::super::StorageError::InvalidName(_)));
    }
}
