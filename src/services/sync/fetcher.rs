//! Bounded image fetching.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::{FetchError, SyncError};
use crate::models::{AssetDescriptor, AssetKind};

/// Remote source of raw image bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Single GET of `url`. Implementations must not retry.
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Append the `w=` width parameter, using `&` when `url` already has a query.
pub fn with_width(url: &str, width: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}w={}", url, separator, width)
}

/// Fetches images under a run-wide cap on in-flight requests.
///
/// The permit is acquired by the caller before a unit starts and held until
/// its fetch and persist both finish, so the cap covers the whole unit.
#[derive(Clone)]
pub struct BoundedFetcher {
    source: Arc<dyn ImageSource>,
    permits: Arc<Semaphore>,
    title_width: u32,
    achievement_width: u32,
}

impl BoundedFetcher {
    pub fn new(source: Arc<dyn ImageSource>, max_in_flight: usize) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            title_width: AssetKind::Title.default_width(),
            achievement_width: AssetKind::Achievement.default_width(),
        }
    }

    pub fn with_widths(mut self, title_width: u32, achievement_width: u32) -> Self {
        self.title_width = title_width;
        self.achievement_width = achievement_width;
        self
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, SyncError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Unexpected("Semaphore closed unexpectedly".to_string()))
    }

    /// Request URL for `descriptor`, width parameter included.
    pub fn request_url(&self, descriptor: &AssetDescriptor) -> String {
        let width = match descriptor.kind {
            AssetKind::Title => self.title_width,
            AssetKind::Achievement => self.achievement_width,
        };
        with_width(descriptor.source_url.trim(), width)
    }

    /// Fetch the bytes for one asset. The caller must hold a permit.
    pub async fn fetch(&self, descriptor: &AssetDescriptor) -> Result<Bytes, FetchError> {
        if !descriptor.has_source_url() {
            return Err(FetchError::MissingUrl);
        }

        let url = self.request_url(descriptor);
        tracing::debug!("Fetching {} {} from {}", descriptor.kind, descriptor.key, url);
        self.source.get_bytes(&url).await
    }
}
