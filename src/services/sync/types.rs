//! Sync service types and events.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{AssetKind, AssetOutcome, StreamStats};

/// Maximum number of image fetches in flight across both streams.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;

/// How a local cache file whose blob is missing from durable storage is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Upload the cached bytes without fetching them again.
    #[default]
    Reupload,
    /// Treat a cache hit as proof the blob is already stored.
    TrustLocal,
}

/// Events emitted during a sync run.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Filtering finished for a stream; `eligible` units will be processed.
    StreamStarted {
        kind: AssetKind,
        stats: StreamStats,
    },
    /// A unit acquired a fetch permit.
    AssetStarted { kind: AssetKind, key: String },
    /// A unit finished, successfully or not.
    AssetFinished { outcome: AssetOutcome },
    /// Every unit of the stream has reported.
    StreamFinished { kind: AssetKind },
}

/// Configuration for the sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the local cache; `{data_dir}/titles` and `{data_dir}/achievements`.
    pub data_dir: PathBuf,
    /// Write fetched bytes to the local cache and consult it when filtering.
    pub local_cache: bool,
    pub cache_policy: CachePolicy,
    pub max_concurrent_fetches: usize,
    pub title_width: u32,
    pub achievement_width: u32,
    /// Stop starting new units once this much time has passed.
    pub run_timeout: Option<Duration>,
}

impl SyncConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            local_cache: true,
            cache_policy: CachePolicy::default(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            title_width: AssetKind::Title.default_width(),
            achievement_width: AssetKind::Achievement.default_width(),
            run_timeout: None,
        }
    }

    /// Local cache directory for `kind`, if the cache is enabled.
    pub fn cache_dir(&self, kind: AssetKind) -> Option<PathBuf> {
        self.local_cache
            .then(|| self.data_dir.join(kind.container()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::new(PathBuf::from("/data"));
        assert_eq!(config.max_concurrent_fetches, 10);
        assert_eq!(config.title_width, 100);
        assert_eq!(config.achievement_width, 400);
        assert_eq!(config.cache_policy, CachePolicy::Reupload);
        assert_eq!(
            config.cache_dir(AssetKind::Achievement),
            Some(PathBuf::from("/data/achievements"))
        );
    }

    #[test]
    fn test_cache_dir_disabled() {
        let mut config = SyncConfig::new(PathBuf::from("/data"));
        config.local_cache = false;
        assert_eq!(config.cache_dir(AssetKind::Title), None);
    }

    #[test]
    fn test_cache_policy_names() {
        use clap::ValueEnum;
        assert_eq!(
            CachePolicy::from_str("trust-local", false),
            Ok(CachePolicy::TrustLocal)
        );
        assert_eq!(CachePolicy::from_str("reupload", false), Ok(CachePolicy::Reupload));
        assert!(CachePolicy::from_str("never", false).is_err());
    }
}
