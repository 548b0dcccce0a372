//! Incremental image sync.
//!
//! Lists titles and achievements from the catalog, skips images that are
//! already stored, and fetches and persists the rest. Both streams run
//! concurrently and share one cap on in-flight fetches. Separated from UI
//! concerns - emits events for progress tracking.

mod error;
mod existence;
mod fetcher;
mod persister;
mod types;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::catalog::AssetSourceCatalog;
use crate::models::{AssetDescriptor, AssetKind, AssetOutcome, AssetStatus, StreamStats, SyncResult};
use crate::storage::{validate_name, DurableStore};

pub use error::{FetchError, PersistError, SyncError};
pub use existence::{Eligibility, ExistenceIndex, IndexSnapshot};
pub use fetcher::{with_width, BoundedFetcher, ImageSource};
pub use persister::AssetPersister;
pub use types::{CachePolicy, SyncConfig, SyncEvent, DEFAULT_MAX_CONCURRENT_FETCHES};

/// A unit of work that passed filtering.
struct Unit {
    descriptor: AssetDescriptor,
    from_cache: bool,
}

/// Filtering result for one stream.
struct StreamPlan {
    stats: StreamStats,
    units: Vec<Unit>,
    skipped: Vec<AssetDescriptor>,
    /// Keys that cannot name a blob; reported as failures, never fetched.
    rejected: Vec<AssetOutcome>,
}

/// Message from a stream to the aggregator.
enum Report {
    Outcome(AssetOutcome),
    /// Sent after every outcome of the stream.
    StreamDone(AssetKind),
}

/// Fires when the run deadline passes or cancellation is requested.
#[derive(Clone)]
struct StopSignal {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl StopSignal {
    fn is_stopped(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
            || self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn stopped(&mut self) {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            let fired = match self.cancel.as_mut() {
                Some(rx) => rx.wait_for(|c| *c).await.map(|_| ()).is_ok(),
                None => false,
            };
            if !fired {
                // Sender gone without cancelling; only the deadline can stop us.
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = expired => {}
            _ = cancelled => {}
        }
    }
}

/// Runs the sync pipeline.
pub struct SyncService {
    catalog: Arc<dyn AssetSourceCatalog>,
    store: Option<Arc<dyn DurableStore>>,
    fetcher: BoundedFetcher,
    persister: AssetPersister,
    config: SyncConfig,
}

impl SyncService {
    /// Create a new sync service. Without a store, images are only cached locally.
    pub fn new(
        catalog: Arc<dyn AssetSourceCatalog>,
        store: Option<Arc<dyn DurableStore>>,
        source: Arc<dyn ImageSource>,
        config: SyncConfig,
    ) -> Self {
        let fetcher = BoundedFetcher::new(source, config.max_concurrent_fetches)
            .with_widths(config.title_width, config.achievement_width);
        let write_local = config.local_cache || store.is_none();
        let persister = AssetPersister::new(store.clone(), write_local);
        Self {
            catalog,
            store,
            fetcher,
            persister,
            config,
        }
    }

    /// Run once without progress events or cancellation.
    pub async fn run(&self) -> Result<SyncResult, SyncError> {
        self.run_with(None, None).await
    }

    /// Run once.
    ///
    /// Progress goes to `events` if given. Setting `cancel` to `true` stops new
    /// units from starting; units already running finish and the partial
    /// result is returned.
    pub async fn run_with(
        &self,
        events: Option<mpsc::Sender<SyncEvent>>,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<SyncResult, SyncError> {
        let started_at = chrono::Utc::now();
        let (titles, achievements) = self.load_descriptors().await?;

        let stop = StopSignal {
            deadline: self.config.run_timeout.map(|t| Instant::now() + t),
            cancel,
        };

        let (outcome_tx, mut outcome_rx) = mpsc::channel::<Report>(100);

        let title_stream = self.run_stream(
            AssetKind::Title,
            titles,
            outcome_tx.clone(),
            events.clone(),
            stop.clone(),
        );
        let achievement_stream = self.run_stream(
            AssetKind::Achievement,
            achievements,
            outcome_tx.clone(),
            events.clone(),
            stop,
        );
        drop(outcome_tx);

        // Sole writer of the result while units are running.
        let aggregate = async {
            let mut result = SyncResult::default();
            while let Some(report) = outcome_rx.recv().await {
                match report {
                    Report::Outcome(outcome) => {
                        emit(&events, SyncEvent::AssetFinished { outcome: outcome.clone() }).await;
                        result.record(outcome);
                    }
                    Report::StreamDone(kind) => {
                        emit(&events, SyncEvent::StreamFinished { kind }).await;
                    }
                }
            }
            result
        };

        let (title_stats, achievement_stats, mut result) =
            tokio::join!(title_stream, achievement_stream, aggregate);
        result.titles = title_stats?;
        result.achievements = achievement_stats?;
        result.started_at = Some(started_at);
        result.finished_at = Some(chrono::Utc::now());

        tracing::info!(
            "Uploaded {} new title images and {} new achievement images ({} failed)",
            result.titles_uploaded,
            result.achievements_uploaded,
            result.failures.len()
        );
        if result.interrupted {
            tracing::warn!(
                "Run stopped early; {} images were not attempted",
                result.cancelled.len()
            );
        }

        Ok(result)
    }

    /// Classify every catalog asset without fetching anything.
    pub async fn survey(&self) -> Result<SyncResult, SyncError> {
        let (titles, achievements) = self.load_descriptors().await?;
        let mut result = SyncResult::default();
        result.titles = self.plan(AssetKind::Title, titles).await.stats;
        result.achievements = self.plan(AssetKind::Achievement, achievements).await.stats;
        Ok(result)
    }

    /// Ask the durable store directly whether `key` of `kind` is stored.
    ///
    /// Errors are logged and reported as absent.
    pub async fn is_stored(&self, kind: AssetKind, key: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let name = format!("{}.png", key);
        match store.exists(kind.container(), &name).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(
                    "Failed to check existence of blob {} in container {}: {}",
                    name,
                    kind.container(),
                    e
                );
                false
            }
        }
    }

    async fn load_descriptors(
        &self,
    ) -> Result<(Vec<AssetDescriptor>, Vec<AssetDescriptor>), SyncError> {
        let (titles, achievements) = tokio::try_join!(
            self.catalog.list_titles(),
            self.catalog.list_achievements()
        )
        .map_err(|e| {
            tracing::error!("Failed to load catalog: {}", e);
            SyncError::from(e)
        })?;

        let data_dir = &self.config.data_dir;
        let titles = unique(
            titles
                .iter()
                .map(|t| AssetDescriptor::for_title(t, data_dir))
                .collect(),
        );
        let achievements = unique(
            achievements
                .iter()
                .map(|a| AssetDescriptor::for_achievement(a, data_dir))
                .collect(),
        );
        Ok((titles, achievements))
    }

    async fn plan(&self, kind: AssetKind, descriptors: Vec<AssetDescriptor>) -> StreamPlan {
        let cache_dir = self.config.cache_dir(kind);
        let index = ExistenceIndex::build(
            kind,
            self.store.as_deref(),
            cache_dir.as_deref(),
            self.config.cache_policy,
        )
        .await;

        let mut plan = StreamPlan {
            stats: StreamStats {
                catalog: descriptors.len(),
                degraded: index.is_degraded(),
                ..Default::default()
            },
            units: Vec::new(),
            skipped: Vec::new(),
            rejected: Vec::new(),
        };

        for descriptor in descriptors {
            if let Err(e) = validate_name(&descriptor.blob_name) {
                tracing::warn!("Rejecting {} {}: {}", kind, descriptor.key, e);
                plan.stats.eligible += 1;
                plan.rejected
                    .push(AssetOutcome::failed(&descriptor, AssetStatus::FetchFailed, e));
                continue;
            }
            match index.classify(&descriptor) {
                Eligibility::Present => plan.stats.existing += 1,
                Eligibility::NoImage => {
                    plan.stats.skipped += 1;
                    plan.skipped.push(descriptor);
                }
                Eligibility::FromCache => {
                    plan.stats.eligible += 1;
                    plan.stats.from_cache += 1;
                    plan.units.push(Unit {
                        descriptor,
                        from_cache: true,
                    });
                }
                Eligibility::Fetch => {
                    plan.stats.eligible += 1;
                    plan.units.push(Unit {
                        descriptor,
                        from_cache: false,
                    });
                }
            }
        }

        tracing::info!(
            "{}: {} in catalog, {} already stored, {} to sync ({} from local cache), {} without image",
            kind.container(),
            plan.stats.catalog,
            plan.stats.existing,
            plan.stats.eligible,
            plan.stats.from_cache,
            plan.stats.skipped
        );
        plan
    }

    async fn run_stream(
        &self,
        kind: AssetKind,
        descriptors: Vec<AssetDescriptor>,
        outcomes: mpsc::Sender<Report>,
        events: Option<mpsc::Sender<SyncEvent>>,
        mut stop: StopSignal,
    ) -> Result<StreamStats, SyncError> {
        let plan = self.plan(kind, descriptors).await;
        emit(&events, SyncEvent::StreamStarted { kind, stats: plan.stats }).await;

        for descriptor in &plan.skipped {
            let _ = outcomes
                .send(Report::Outcome(AssetOutcome::new(descriptor, AssetStatus::Skipped)))
                .await;
        }
        for outcome in plan.rejected {
            let _ = outcomes.send(Report::Outcome(outcome)).await;
        }

        let mut units = JoinSet::new();
        let mut stopped = false;

        for unit in plan.units {
            let permit = if stopped || stop.is_stopped() {
                None
            } else {
                tokio::select! {
                    biased;
                    _ = stop.stopped() => None,
                    permit = self.fetcher.acquire() => Some(permit?),
                }
            };

            let Some(permit) = permit else {
                stopped = true;
                let _ = outcomes
                    .send(Report::Outcome(AssetOutcome::new(
                        &unit.descriptor,
                        AssetStatus::Cancelled,
                    )))
                    .await;
                continue;
            };

            emit(
                &events,
                SyncEvent::AssetStarted {
                    kind,
                    key: unit.descriptor.key.clone(),
                },
            )
            .await;

            let fetcher = self.fetcher.clone();
            let persister = self.persister.clone();
            let outcomes = outcomes.clone();
            units.spawn(async move {
                let outcome = process_unit(&fetcher, &persister, &unit).await;
                drop(permit);
                let _ = outcomes.send(Report::Outcome(outcome)).await;
            });
        }

        while let Some(joined) = units.join_next().await {
            joined?;
        }

        let _ = outcomes.send(Report::StreamDone(kind)).await;
        Ok(plan.stats)
    }
}

/// Fetch (or read from cache) and persist one asset.
async fn process_unit(
    fetcher: &BoundedFetcher,
    persister: &AssetPersister,
    unit: &Unit,
) -> AssetOutcome {
    let descriptor = &unit.descriptor;

    if unit.from_cache {
        return match persister.restore_from_cache(descriptor).await {
            Ok(()) => AssetOutcome::new(descriptor, AssetStatus::Reuploaded),
            Err(e) => {
                tracing::warn!("Failed to upload cached image {}: {}", descriptor.blob_name, e);
                AssetOutcome::failed(descriptor, AssetStatus::UploadFailed, e)
            }
        };
    }

    let data = match fetcher.fetch(descriptor).await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(
                "Failed to download image for {} {}: {}",
                descriptor.kind,
                descriptor.key,
                e
            );
            return AssetOutcome::failed(descriptor, AssetStatus::FetchFailed, e);
        }
    };

    match persister.persist(descriptor, data).await {
        Ok(()) => AssetOutcome::new(descriptor, AssetStatus::Fetched),
        Err(e) => {
            tracing::warn!("Failed to persist {}: {}", descriptor.blob_name, e);
            AssetOutcome::failed(descriptor, AssetStatus::UploadFailed, e).with_fetched(true)
        }
    }
}

/// Drop repeated blob names, keeping the first occurrence.
fn unique(descriptors: Vec<AssetDescriptor>) -> Vec<AssetDescriptor> {
    let total = descriptors.len();
    let mut seen = HashSet::with_capacity(total);
    let unique: Vec<_> = descriptors
        .into_iter()
        .filter(|d| seen.insert(d.blob_name.clone()))
        .collect();
    if unique.len() < total {
        tracing::debug!("Ignoring {} duplicate catalog entries", total - unique.len());
    }
    unique
}

async fn emit(events: &Option<mpsc::Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_unique_keeps_first() {
        let d = |key: &str, url: &str| {
            AssetDescriptor::new(AssetKind::Title, key.into(), url.into(), Path::new("/d"))
        };
        let out = unique(vec![d("1", "a"), d("2", "b"), d("1", "c")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source_url, "a");
    }

    #[tokio::test]
    async fn test_stop_signal_deadline() {
        let mut stop = StopSignal {
            deadline: Some(Instant::now()),
            cancel: None,
        };
        assert!(stop.is_stopped());
        stop.stopped().await;
    }

    #[tokio::test]
    async fn test_stop_signal_cancel() {
        let (tx, rx) = watch::channel(false);
        let mut stop = StopSignal {
            deadline: None,
            cancel: Some(rx),
        };
        assert!(!stop.is_stopped());
        tx.send(true).unwrap();
        assert!(stop.is_stopped());
        stop.stopped().await;
    }
}
