//! Snapshot module
//!
//! Point-in-time projected state, addressable by snapshot id.

mod manager;
mod record;

pub use manager::{SnapshotListQuery, SnapshotManager};
pub use record::Snapshot;

use crate::domain::AggregateKey;
use crate::error::StoreResult;
use crate::event_store::EventStorage;

/// Newest snapshot of `key` with `as_of_version <= version`
pub fn latest_at_or_below(
    storage: &dyn EventStorage,
    key: &AggregateKey,
    version: u64,
) -> StoreResult<Option<Snapshot>> {
    storage.latest_snapshot_at_or_below(key, version)
}
