//! Service layer for xblsync.
//!
//! This module contains domain logic separated from UI concerns.

pub mod sync;

pub use sync::{SyncConfig, SyncError, SyncEvent, SyncService};
