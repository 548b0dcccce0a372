//! Snapshot of which assets are already stored.
//!
//! Built once per stream at the start of a run and only read afterwards,
//! so it can be shared between units without locking.

use std::collections::HashSet;
use std::path::Path;

use super::types::CachePolicy;
use crate::models::{AssetDescriptor, AssetKind};
use crate::storage::{list_files, DurableStore, StorageError};

/// Blob names listed from the durable store.
///
/// A failed listing yields an empty set with `degraded` carrying the error,
/// so the run re-syncs everything instead of aborting.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    pub names: HashSet<String>,
    pub degraded: Option<StorageError>,
}

impl IndexSnapshot {
    /// List `container` in `store`. A missing store is an empty snapshot.
    pub async fn list(store: Option<&dyn DurableStore>, container: &str) -> Self {
        let Some(store) = store else {
            return Self::default();
        };

        match store.existing_blobs(container, "").await {
            Ok(names) => {
                tracing::info!(
                    "Found {} existing blobs in {}/{}",
                    names.len(),
                    store.describe(),
                    container
                );
                Self {
                    names,
                    degraded: None,
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to list blobs in {}/{}, treating as empty: {}",
                    store.describe(),
                    container,
                    e
                );
                Self {
                    names: HashSet::new(),
                    degraded: Some(e),
                }
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// What to do with one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// Already stored; no work.
    Present,
    /// No image to fetch; recorded as skipped.
    NoImage,
    /// Upload the local cache file without fetching.
    FromCache,
    /// Fetch from the image source, then persist.
    Fetch,
}

/// Existence snapshot for one asset kind.
#[derive(Debug)]
pub struct ExistenceIndex {
    durable: IndexSnapshot,
    cached: HashSet<String>,
    has_store: bool,
    policy: CachePolicy,
}

impl ExistenceIndex {
    /// Build the index for `kind`.
    ///
    /// `cache_dir` is consulted as a cheaper substitute for durable checks.
    /// Without a durable store every cache hit counts as present.
    pub async fn build(
        kind: AssetKind,
        store: Option<&dyn DurableStore>,
        cache_dir: Option<&Path>,
        policy: CachePolicy,
    ) -> Self {
        let durable = IndexSnapshot::list(store, kind.container()).await;

        let cached = match cache_dir {
            Some(dir) => match list_files(dir, "").await {
                Ok(names) => names,
                Err(e) => {
                    tracing::warn!("Failed to read local cache {}: {}", dir.display(), e);
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        Self {
            durable,
            cached,
            has_store: store.is_some(),
            policy,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.durable.is_degraded()
    }

    pub fn durable_count(&self) -> usize {
        self.durable.names.len()
    }

    /// Whether `blob_name` is in the durable snapshot.
    pub fn is_stored(&self, blob_name: &str) -> bool {
        self.durable.names.contains(blob_name)
    }

    pub fn is_cached(&self, blob_name: &str) -> bool {
        self.cached.contains(blob_name)
    }

    /// Whether the asset counts as present under the configured policy.
    pub fn is_present(&self, blob_name: &str) -> bool {
        if self.is_stored(blob_name) {
            return true;
        }
        let trust_cache = !self.has_store || self.policy == CachePolicy::TrustLocal;
        trust_cache && self.is_cached(blob_name)
    }

    /// Classify a descriptor of this index's kind.
    ///
    /// Titles without an image stay eligible and fail at fetch time;
    /// achievements without one are skipped.
    pub fn classify(&self, descriptor: &AssetDescriptor) -> Eligibility {
        if self.is_present(&descriptor.blob_name) {
            return Eligibility::Present;
        }
        if self.is_cached(&descriptor.blob_name) {
            return Eligibility::FromCache;
        }
        if descriptor.kind == AssetKind::Achievement && !descriptor.has_source_url() {
            return Eligibility::NoImage;
        }
        Eligibility::Fetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn title(key: &str, url: &str) -> AssetDescriptor {
        AssetDescriptor::new(AssetKind::Title, key.into(), url.into(), Path::new("/d"))
    }

    fn achievement(key: &str, url: &str) -> AssetDescriptor {
        AssetDescriptor::new(AssetKind::Achievement, key.into(), url.into(), Path::new("/d"))
    }

    #[tokio::test]
    async fn test_stored_blobs_are_present() {
        let store = MemoryBlobStore::new();
        store.insert("titles", "1.png", &b"x"[..]).await;

        let index =
            ExistenceIndex::build(AssetKind::Title, Some(&store), None, CachePolicy::Reupload)
                .await;

        assert!(!index.is_degraded());
        assert_eq!(index.classify(&title("1", "http://a")), Eligibility::Present);
        assert_eq!(index.classify(&title("2", "http://a")), Eligibility::Fetch);
    }

    #[tokio::test]
    async fn test_listing_failure_degrades_to_empty() {
        let store = MemoryBlobStore::new();
        store.insert("titles", "1.png", &b"x"[..]).await;
        store.fail_listing(true).await;

        let index =
            ExistenceIndex::build(AssetKind::Title, Some(&store), None, CachePolicy::Reupload)
                .await;

        assert!(index.is_degraded());
        assert_eq!(index.durable_count(), 0);
        assert_eq!(index.classify(&title("1", "http://a")), Eligibility::Fetch);
    }

    #[tokio::test]
    async fn test_missing_store_is_empty() {
        let index =
            ExistenceIndex::build(AssetKind::Title, None, None, CachePolicy::Reupload).await;
        assert!(!index.is_degraded());
        assert_eq!(index.durable_count(), 0);
    }

    #[tokio::test]
    async fn test_achievement_without_url_is_skipped() {
        let index =
            ExistenceIndex::build(AssetKind::Achievement, None, None, CachePolicy::Reupload).await;
        assert_eq!(index.classify(&achievement("1.2", "")), Eligibility::NoImage);
        assert_eq!(index.classify(&title("1", "  ")), Eligibility::Fetch);
    }

    #[tokio::test]
    async fn test_cache_policy() {
        let dir = tempdir().unwrap();
        let cache: PathBuf = dir.path().join("titles");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("5.png"), b"cached").unwrap();
        let store = MemoryBlobStore::new();

        let reupload = ExistenceIndex::build(
            AssetKind::Title,
            Some(&store),
            Some(cache.as_path()),
            CachePolicy::Reupload,
        )
        .await;
        assert_eq!(reupload.classify(&title("5", "http://a")), Eligibility::FromCache);

        let trusting = ExistenceIndex::build(
            AssetKind::Title,
            Some(&store),
            Some(cache.as_path()),
            CachePolicy::TrustLocal,
        )
        .await;
        assert_eq!(trusting.classify(&title("5", "http://a")), Eligibility::Present);

        let local_only =
            ExistenceIndex::build(AssetKind::Title, None, Some(cache.as_path()), CachePolicy::Reupload)
                .await;
        assert_eq!(local_only.classify(&title("5", "http://a")), Eligibility::Present);
    }
}
