//! Per-asset outcomes and the aggregate result of a sync run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::asset::{AssetDescriptor, AssetKind};

/// What happened to a single asset during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Fetched from the image source and persisted.
    Fetched,
    /// Uploaded from the local cache without a network fetch.
    Reuploaded,
    /// Not eligible for work (no image to fetch).
    Skipped,
    FetchFailed,
    UploadFailed,
    /// Never started because the run was stopped first.
    Cancelled,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Reuploaded => "reuploaded",
            Self::Skipped => "skipped",
            Self::FetchFailed => "fetch_failed",
            Self::UploadFailed => "upload_failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FetchFailed | Self::UploadFailed)
    }
}

/// Result for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetOutcome {
    pub key: String,
    pub kind: AssetKind,
    pub status: AssetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether bytes were retrieved from the image source for this asset.
    #[serde(skip)]
    pub fetched: bool,
}

impl AssetOutcome {
    pub fn new(descriptor: &AssetDescriptor, status: AssetStatus) -> Self {
        Self {
            key: descriptor.key.clone(),
            kind: descriptor.kind,
            status,
            error: None,
            fetched: status == AssetStatus::Fetched,
        }
    }

    pub fn failed(descriptor: &AssetDescriptor, status: AssetStatus, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(descriptor, status)
        }
    }

    pub fn with_fetched(mut self, fetched: bool) -> Self {
        self.fetched = fetched;
        self
    }
}

/// Per-stream bookkeeping taken while filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Records in the catalog snapshot.
    pub catalog: usize,
    /// Records whose blob was already present.
    pub existing: usize,
    /// Records scheduled for fetch or re-upload.
    pub eligible: usize,
    /// Records without an image that were not attempted.
    pub skipped: usize,
    /// Eligible records served from the local cache.
    pub from_cache: usize,
    /// Whether the existence snapshot fell back to empty after a listing error.
    pub degraded: bool,
}

/// Aggregate outcome of one run.
///
/// Mutated only by the run's aggregator; returned once both streams finish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub titles_downloaded: usize,
    pub titles_uploaded: usize,
    pub achievements_downloaded: usize,
    pub achievements_uploaded: usize,
    pub titles: StreamStats,
    pub achievements: StreamStats,
    /// Failed assets, in completion order.
    pub failures: Vec<AssetOutcome>,
    /// Assets abandoned because the run deadline passed or it was cancelled.
    pub cancelled: Vec<AssetOutcome>,
    /// True when the run stopped before every eligible asset was attempted.
    pub interrupted: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    /// Fold one asset outcome into the counters.
    pub fn record(&mut self, outcome: AssetOutcome) {
        if outcome.fetched {
            *self.downloaded_mut(outcome.kind) += 1;
        }
        match outcome.status {
            AssetStatus::Fetched | AssetStatus::Reuploaded => {
                *self.uploaded_mut(outcome.kind) += 1;
            }
            AssetStatus::FetchFailed | AssetStatus::UploadFailed => self.failures.push(outcome),
            AssetStatus::Cancelled => {
                self.interrupted = true;
                self.cancelled.push(outcome);
            }
            AssetStatus::Skipped => {}
        }
    }

    pub fn downloaded(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::Title => self.titles_downloaded,
            AssetKind::Achievement => self.achievements_downloaded,
        }
    }

    pub fn uploaded(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::Title => self.titles_uploaded,
            AssetKind::Achievement => self.achievements_uploaded,
        }
    }

    pub fn stats(&self, kind: AssetKind) -> &StreamStats {
        match kind {
            AssetKind::Title => &self.titles,
            AssetKind::Achievement => &self.achievements,
        }
    }

    pub fn failures_for(&self, kind: AssetKind) -> impl Iterator<Item = &AssetOutcome> {
        self.failures.iter().filter(move |o| o.kind == kind)
    }

    /// Wall-clock duration of the run, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    /// Number of durable mutations made by this run.
    pub fn total_changes(&self) -> usize {
        self.titles_uploaded + self.achievements_uploaded
    }

    fn downloaded_mut(&mut self, kind: AssetKind) -> &mut usize {
        match kind {
            AssetKind::Title => &mut self.titles_downloaded,
            AssetKind::Achievement => &mut self.achievements_downloaded,
        }
    }

    fn uploaded_mut(&mut self, kind: AssetKind) -> &mut usize {
        match kind {
            AssetKind::Title => &mut self.titles_uploaded,
            AssetKind::Achievement => &mut self.achievements_uploaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn descriptor(kind: AssetKind, key: &str) -> AssetDescriptor {
        AssetDescriptor::new(kind, key.to_string(), "http://x".into(), Path::new("/d"))
    }

    #[test]
    fn test_record_counts_per_kind() {
        let mut result = SyncResult::default();
        result.record(AssetOutcome::new(&descriptor(AssetKind::Title, "1"), AssetStatus::Fetched));
        result.record(AssetOutcome::new(
            &descriptor(AssetKind::Achievement, "1.2"),
            AssetStatus::Reuploaded,
        ));

        assert_eq!(result.titles_downloaded, 1);
        assert_eq!(result.titles_uploaded, 1);
        assert_eq!(result.achievements_downloaded, 0);
        assert_eq!(result.achievements_uploaded, 1);
        assert_eq!(result.total_changes(), 2);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_upload_failure_after_fetch_counts_download() {
        let mut result = SyncResult::default();
        let d = descriptor(AssetKind::Title, "9");
        result.record(
            AssetOutcome::failed(&d, AssetStatus::UploadFailed, "503").with_fetched(true),
        );

        assert_eq!(result.titles_downloaded, 1);
        assert_eq!(result.titles_uploaded, 0);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].error.as_deref(), Some("503"));
        assert_eq!(result.total_changes(), 0);
    }

    #[test]
    fn test_cancelled_marks_interrupted() {
        let mut result = SyncResult::default();
        let d = descriptor(AssetKind::Achievement, "1.1");
        result.record(AssetOutcome::new(&d, AssetStatus::Cancelled));
        result.record(AssetOutcome::new(&d, AssetStatus::Skipped));

        assert!(result.interrupted);
        assert_eq!(result.cancelled.len(), 1);
        assert!(result.failures.is_empty());
        assert_eq!(result.total_changes(), 0);
    }
}
