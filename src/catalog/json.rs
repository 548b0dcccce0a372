//! Catalog read from JSON exports in the data directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{AssetSourceCatalog, CatalogError, CatalogResult};
use crate::models::{Achievement, Title};

/// Default titles export filename.
pub const TITLES_FILE: &str = "titles.json";
/// Default achievements export filename.
pub const ACHIEVEMENTS_FILE: &str = "achievements.json";

/// Accepts either a bare array or an object wrapping one or more arrays,
/// e.g. `{"titles": [...]}` as returned by the upstream API.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    List(Vec<T>),
    Keyed(BTreeMap<String, Vec<T>>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::List(items) => items,
            Listing::Keyed(map) => map.into_values().flatten().collect(),
        }
    }
}

/// Reads `titles.json` and `achievements.json`.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    titles_path: PathBuf,
    achievements_path: PathBuf,
}

impl JsonCatalog {
    pub fn new(titles_path: PathBuf, achievements_path: PathBuf) -> Self {
        Self {
            titles_path,
            achievements_path,
        }
    }

    /// Catalog using the default filenames inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(TITLES_FILE), data_dir.join(ACHIEVEMENTS_FILE))
    }

    async fn read_listing<T: DeserializeOwned>(path: &Path) -> CatalogResult<Vec<T>> {
        let display = path.display().to_string();
        let contents = tokio::fs::read(path).await.map_err(|e| CatalogError::Io {
            path: display.clone(),
            source: e,
        })?;
        let listing: Listing<T> =
            serde_json::from_slice(&contents).map_err(|e| CatalogError::Parse {
                path: display,
                source: e,
            })?;
        Ok(listing.into_vec())
    }
}

#[async_trait]
impl AssetSourceCatalog for JsonCatalog {
    async fn list_titles(&self) -> CatalogResult<Vec<Title>> {
        let titles = Self::read_listing(&self.titles_path).await?;
        tracing::debug!(
            "Loaded {} titles from {}",
            titles.len(),
            self.titles_path.display()
        );
        Ok(titles)
    }

    async fn list_achievements(&self) -> CatalogResult<Vec<Achievement>> {
        let achievements = Self::read_listing(&self.achievements_path).await?;
        tracing::debug!(
            "Loaded {} achievements from {}",
            achievements.len(),
            self.achievements_path.display()
        );
        Ok(achievements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reads_bare_arrays() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(TITLES_FILE),
            r#"[{"titleId": "10", "name": "A", "displayImage": "http://a"}]"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(ACHIEVEMENTS_FILE),
            r#"[{"id": "1", "titleId": 10, "name": "x", "displayImage": "http://b?x=1"}]"#,
        )
        .unwrap();

        let catalog = JsonCatalog::in_dir(dir.path());
        let titles = catalog.list_titles().await.unwrap();
        let achievements = catalog.list_achievements().await.unwrap();

        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].title_id, 10);
        assert_eq!(achievements.len(), 1);
        assert_eq!(achievements[0].title_id, 10);
    }

    #[tokio::test]
    async fn test_reads_wrapped_listing() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(TITLES_FILE),
            r#"{"titles": [{"titleId": 1}, {"titleId": 2}]}"#,
        )
        .unwrap();

        let catalog = JsonCatalog::in_dir(dir.path());
        let titles = catalog.list_titles().await.unwrap();
        assert_eq!(titles.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let catalog = JsonCatalog::in_dir(dir.path());
        let err = catalog.list_achievements().await.unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TITLES_FILE), "not json").unwrap();
        let catalog = JsonCatalog::in_dir(dir.path());
        let err = catalog.list_titles().await.unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }
}
