//! Asset descriptors: one downloadable image per catalog record.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::record::{Achievement, Title};

/// Which catalog stream an asset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Title,
    Achievement,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Title, AssetKind::Achievement];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Achievement => "achievement",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "title" | "titles" => Some(Self::Title),
            "achievement" | "achievements" => Some(Self::Achievement),
            _ => None,
        }
    }

    /// Durable store container (and local cache subdirectory) for this kind.
    pub fn container(&self) -> &'static str {
        match self {
            Self::Title => "titles",
            Self::Achievement => "achievements",
        }
    }

    /// Default `w=` query value requested from the image source.
    pub fn default_width(&self) -> u32 {
        match self {
            Self::Title => 100,
            Self::Achievement => 400,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asset to synchronize.
///
/// `key` is unique within `kind`; `blob_name` is always `key + ".png"`, so
/// two descriptors of the same kind never share a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub kind: AssetKind,
    pub key: String,
    /// Remote image URL, possibly empty when the record has no image.
    pub source_url: String,
    pub blob_name: String,
    pub local_path: PathBuf,
}

impl AssetDescriptor {
    pub fn new(kind: AssetKind, key: String, source_url: String, data_dir: &Path) -> Self {
        let blob_name = format!("{}.png", key);
        let local_path = data_dir.join(kind.container()).join(&blob_name);
        Self {
            kind,
            key,
            source_url,
            blob_name,
            local_path,
        }
    }

    pub fn for_title(title: &Title, data_dir: &Path) -> Self {
        Self::new(
            AssetKind::Title,
            title.title_id.to_string(),
            title.display_image.clone().unwrap_or_default(),
            data_dir,
        )
    }

    pub fn for_achievement(achievement: &Achievement, data_dir: &Path) -> Self {
        Self::new(
            AssetKind::Achievement,
            format!("{}.{}", achievement.title_id, achievement.id),
            achievement.display_image.clone().unwrap_or_default(),
            data_dir,
        )
    }

    pub fn has_source_url(&self) -> bool {
        !self.source_url.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_descriptor() {
        let title = Title::new(1234, "Game", Some("https://images/t.png"));
        let d = AssetDescriptor::for_title(&title, Path::new("/data"));
        assert_eq!(d.kind, AssetKind::Title);
        assert_eq!(d.key, "1234");
        assert_eq!(d.blob_name, "1234.png");
        assert_eq!(d.local_path, PathBuf::from("/data/titles/1234.png"));
        assert!(d.has_source_url());
    }

    #[test]
    fn test_achievement_descriptor() {
        let achievement = Achievement::new(1234, "17", "Win", None);
        let d = AssetDescriptor::for_achievement(&achievement, Path::new("/data"));
        assert_eq!(d.key, "1234.17");
        assert_eq!(d.blob_name, "1234.17.png");
        assert_eq!(
            d.local_path,
            PathBuf::from("/data/achievements/1234.17.png")
        );
        assert!(!d.has_source_url());
    }

    #[test]
    fn test_kind_round_trip_names() {
        for kind in AssetKind::ALL {
            assert_eq!(AssetKind::from_str(kind.as_str()), Some(kind));
            assert_eq!(AssetKind::from_str(kind.container()), Some(kind));
        }
        assert_eq!(AssetKind::from_str("stats"), None);
    }
}
