//! Snapshot Manager
//!
//! Captures projected state at the current version so later projections can
//! start from it instead of replaying the whole log. Snapshots are an
//! optimization only; deleting every one of them changes no result.

use std::sync::Arc;

use chrono::Utc;

use super::Snapshot;
use crate::aggregate::{AggregateIndex, AggregateRecord};
use crate::audit::Verifier;
use crate::domain::AggregateKey;
use crate::error::{StoreError, StoreResult};
use crate::event_store::EventStorage;
use crate::pagination::{self, Page};
use crate::projection::StateProjector;

/// Filters and paging for a snapshot listing
#[derive(Debug, Clone, Default)]
pub struct SnapshotListQuery {
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    pub offset: usize,
    pub take: usize,
}

#[derive(Clone)]
pub struct SnapshotManager {
    storage: Arc<dyn EventStorage>,
    index: AggregateIndex,
    projector: StateProjector,
    verifier: Verifier,
}

impl SnapshotManager {
    pub fn new(
        storage: Arc<dyn EventStorage>,
        index: AggregateIndex,
        projector: StateProjector,
        verifier: Verifier,
    ) -> Self {
        Self {
            storage,
            index,
            projector,
            verifier,
        }
    }

    // =========================================================================
    // create_snapshot
    // =========================================================================

    /// Snapshot the aggregate at its current version.
    ///
    /// The caller holds the aggregate's lock, so `record.current_version` is
    /// stable for the duration. With `verify`, a broken chain fails with
    /// `StoreError::Integrity` and nothing is written.
    pub fn create_snapshot(
        &self,
        record: &AggregateRecord,
        comment: Option<String>,
        verify: bool,
    ) -> StoreResult<Snapshot> {
        let key = record.key();

        if verify {
            self.verifier.verify(record, None)?.into_result()?;
        }

        let projected = self.projector.project(record, None, true, None)?;

        let snapshot = Snapshot {
            snapshot_id: self.storage.next_snapshot_id()?,
            aggregate_type: key.aggregate_type.clone(),
            aggregate_id: key.aggregate_id.clone(),
            as_of_version: projected.version,
            projected_state: projected.state,
            chain_head: record.head_hash,
            created_at: Utc::now(),
            comment,
        };

        self.storage.insert_snapshot(snapshot.clone())?;
        self.index
            .note_snapshot(&key, snapshot.as_of_version, snapshot.snapshot_id)?;

        tracing::info!(
            aggregate = %key,
            snapshot_id = snapshot.snapshot_id,
            as_of_version = snapshot.as_of_version,
            "Snapshot created"
        );

        Ok(snapshot)
    }

    // =========================================================================
    // reads
    // =========================================================================

    /// Snapshots in id order
    pub fn list_snapshots(&self, query: &SnapshotListQuery) -> StoreResult<Page<Snapshot>> {
        let aggregate_type = query.aggregate_type.as_deref().filter(|t| !t.trim().is_empty());
        let aggregate_id = query.aggregate_id.as_deref().filter(|id| !id.trim().is_empty());

        let mut snapshots = self.storage.snapshots(aggregate_type, aggregate_id)?;
        snapshots.sort_by_key(|s| s.snapshot_id);
        Ok(pagination::paginate(snapshots, query.offset, query.take))
    }

    pub fn get_snapshot(&self, snapshot_id: u64) -> StoreResult<Snapshot> {
        self.storage
            .snapshot(snapshot_id)?
            .ok_or_else(|| StoreError::snapshot_not_found(snapshot_id))
    }

    pub fn latest_at_or_below(&self, key: &AggregateKey, version: u64) -> StoreResult<Option<Snapshot>> {
        super::latest_at_or_below(self.storage.as_ref(), key, version)
    }
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager").finish_non_exhaustive()
    }
}
