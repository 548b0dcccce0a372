//! Data models for xblsync.

mod asset;
mod outcome;
mod record;

pub use asset::{AssetDescriptor, AssetKind};
pub use outcome::{AssetOutcome, AssetStatus, StreamStats, SyncResult};
pub use record::{Achievement, Title};
