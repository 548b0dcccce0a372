//! Fixed in-memory catalog.

use async_trait::async_trait;

use super::{AssetSourceCatalog, CatalogError, CatalogResult};
use crate::models::{Achievement, Title};

/// Catalog backed by records held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    titles: Vec<Title>,
    achievements: Vec<Achievement>,
    unavailable: Option<String>,
}

impl StaticCatalog {
    pub fn new(titles: Vec<Title>, achievements: Vec<Achievement>) -> Self {
        Self {
            titles,
            achievements,
            unavailable: None,
        }
    }

    /// A catalog whose every listing fails with the given reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    fn check(&self) -> CatalogResult<()> {
        match &self.unavailable {
            Some(reason) => Err(CatalogError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AssetSourceCatalog for StaticCatalog {
    async fn list_titles(&self) -> CatalogResult<Vec<Title>> {
        self.check()?;
        Ok(self.titles.clone())
    }

    async fn list_achievements(&self) -> CatalogResult<Vec<Achievement>> {
        self.check()?;
        Ok(self.achievements.clone())
    }
}
