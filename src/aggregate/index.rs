//! Aggregate Index
//!
//! Maps `(aggregate_type, aggregate_id)` to its [`AggregateRecord`]. Callers
//! mutating a record must hold that aggregate's lock from
//! [`crate::lock_manager::LockManager`]; the index itself does no locking.

use std::sync::Arc;

use chrono::Utc;

use super::sort::{self, AggregateSort};
use super::AggregateRecord;
use crate::domain::{AggregateKey, Event};
use crate::error::{StoreError, StoreResult};
use crate::event_store::{EventLog, EventStorage};
use crate::pagination::{self, Page};

/// What `create_aggregate` is about to do for a key
#[derive(Debug, Clone, PartialEq)]
pub enum CreatePlan {
    /// No record exists; the create event starts the chain at 1
    New,
    /// An archived record is brought back; its chain continues
    Resurrect(AggregateRecord),
}

/// Filters and paging for an aggregate listing
#[derive(Debug, Clone, Default)]
pub struct AggregateListQuery {
    /// `None` lists every type
    pub aggregate_type: Option<String>,
    pub include_archived: bool,
    pub archived_only: bool,
    pub sort: Vec<AggregateSort>,
    pub offset: usize,
    pub take: usize,
}

impl AggregateListQuery {
    fn admits(&self, record: &AggregateRecord) -> bool {
        if self.archived_only {
            record.archived
        } else {
            self.include_archived || !record.archived
        }
    }
}

#[derive(Clone)]
pub struct AggregateIndex {
    storage: Arc<dyn EventStorage>,
}

impl AggregateIndex {
    pub fn new(storage: Arc<dyn EventStorage>) -> Self {
        Self { storage }
    }

    pub fn find(&self, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>> {
        self.storage.record(key)
    }

    /// Fetch a record, failing with `NotFound` when absent
    pub fn get(&self, key: &AggregateKey) -> StoreResult<AggregateRecord> {
        self.find(key)?
            .ok_or_else(|| StoreError::aggregate_not_found(&key.aggregate_type, &key.aggregate_id))
    }

    /// Fetch a record that accepts mutations
    pub fn get_active(&self, key: &AggregateKey) -> StoreResult<AggregateRecord> {
        let record = self.get(key)?;
        if record.archived {
            return Err(StoreError::archived(&key.aggregate_type, &key.aggregate_id));
        }
        Ok(record)
    }

    /// Decide whether a create may proceed
    pub fn prepare_create(&self, key: &AggregateKey, resurrect: bool) -> StoreResult<CreatePlan> {
        match self.find(key)? {
            None => Ok(CreatePlan::New),
            Some(record) if !record.archived && record.current_version > 0 => {
                Err(StoreError::AlreadyExists {
                    aggregate_type: key.aggregate_type.clone(),
                    aggregate_id: key.aggregate_id.clone(),
                })
            }
            Some(record) if record.archived && !resurrect => Err(StoreError::Conflict(format!(
                "aggregate {} is archived; pass resurrect to re-create it",
                key
            ))),
            Some(record) => Ok(CreatePlan::Resurrect(record)),
        }
    }

    /// The record as it stands after `event`, without storing it
    pub fn next_record(&self, existing: Option<AggregateRecord>, event: &Event) -> AggregateRecord {
        match existing {
            Some(mut record) => {
                record.advance(event);
                record.archived = false;
                record.archived_at = None;
                record.archive_note = None;
                record
            }
            None => AggregateRecord::from_first_event(event),
        }
    }

    /// Fold a freshly appended event into the index
    pub fn record_event(
        &self,
        existing: Option<AggregateRecord>,
        event: &Event,
    ) -> StoreResult<AggregateRecord> {
        let record = self.next_record(existing, event);
        self.save(&record)?;
        Ok(record)
    }

    pub fn save(&self, record: &AggregateRecord) -> StoreResult<()> {
        self.storage.upsert_record(record.clone())
    }

    /// Bring the stored record in line with the head of the log.
    ///
    /// A record can lag the log when an index write failed after its event
    /// was committed. Returns the up-to-date record, `None` when the log is
    /// empty and no record exists.
    pub fn reconcile(&self, log: &EventLog, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>> {
        let stored = self.find(key)?;
        let Some(last) = log.last_event(key)? else {
            return Ok(stored);
        };

        match stored {
            Some(record)
                if record.current_version == last.sequence_number
                    && record.head_hash == last.own_hash =>
            {
                Ok(Some(record))
            }
            stored => {
                tracing::warn!(
                    aggregate = %key,
                    indexed_version = stored.as_ref().map_or(0, |r| r.current_version),
                    log_version = last.sequence_number,
                    "Aggregate record behind event log, rebuilding"
                );
                self.rebuild(log, key)
            }
        }
    }

    /// Toggle the archival flag. Version and events are untouched.
    ///
    /// Archiving an archived aggregate is rejected; unarchiving an active
    /// one is a no-op.
    pub fn set_archived(
        &self,
        key: &AggregateKey,
        archived: bool,
        note: Option<String>,
    ) -> StoreResult<AggregateRecord> {
        let mut record = self.get(key)?;

        match (record.archived, archived) {
            (true, true) => {
                return Err(StoreError::archived(&key.aggregate_type, &key.aggregate_id));
            }
            (false, false) => return Ok(record),
            (false, true) => {
                let now = Utc::now();
                record.archived = true;
                record.archived_at = Some(now);
                record.archive_note = note;
                record.updated_at = now;
            }
            (true, false) => {
                record.archived = false;
                record.archived_at = None;
                record.archive_note = None;
                record.updated_at = Utc::now();
            }
        }

        self.storage.upsert_record(record.clone())?;
        Ok(record)
    }

    /// Record the snapshot that is now the fast-path baseline
    pub fn note_snapshot(
        &self,
        key: &AggregateKey,
        as_of_version: u64,
        snapshot_id: u64,
    ) -> StoreResult<AggregateRecord> {
        let mut record = self.get(key)?;
        if record.latest_snapshot_version.map_or(true, |v| as_of_version >= v) {
            record.latest_snapshot_version = Some(as_of_version);
            record.latest_snapshot_id = Some(snapshot_id);
            self.storage.upsert_record(record.clone())?;
        }
        Ok(record)
    }

    pub fn list(&self, query: &AggregateListQuery) -> StoreResult<Page<AggregateRecord>> {
        let aggregate_type = query.aggregate_type.as_deref().filter(|t| !t.trim().is_empty());
        let mut records: Vec<AggregateRecord> = self
            .storage
            .records(aggregate_type)?
            .into_iter()
            .filter(|r| query.admits(r))
            .collect();

        records.sort_by(|a, b| sort::compare(&query.sort, a, b));
        Ok(pagination::paginate(records, query.offset, query.take))
    }

    /// Recompute a record's version and head from the event log alone.
    ///
    /// Archival and snapshot bookkeeping are not events, so they are carried
    /// over from the stored record when one exists.
    pub fn rebuild(&self, log: &EventLog, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>> {
        let Some(last) = log.last_event(key)? else {
            return Ok(None);
        };

        let first = log
            .read_range(key, 1, 1, None)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Storage(format!("first event of {} missing", key)))?;

        let mut rebuilt = AggregateRecord::from_first_event(&first);
        rebuilt.advance(&last);
        rebuilt.created_at = first.metadata.created_at;
        rebuilt.updated_at = last.metadata.created_at;

        if let Some(stored) = self.find(key)? {
            rebuilt.created_at = stored.created_at;
            rebuilt.updated_at = stored.updated_at.max(rebuilt.updated_at);
            rebuilt.archived = stored.archived;
            rebuilt.archived_at = stored.archived_at;
            rebuilt.archive_note = stored.archive_note;
            rebuilt.latest_snapshot_version = stored
                .latest_snapshot_version
                .filter(|v| *v <= rebuilt.current_version);
            rebuilt.latest_snapshot_id = rebuilt
                .latest_snapshot_version
                .and(stored.latest_snapshot_id);
        }

        self.storage.upsert_record(rebuilt.clone())?;
        tracing::info!(
            aggregate = %key,
            current_version = rebuilt.current_version,
            "Aggregate record rebuilt from event log"
        );
        Ok(Some(rebuilt))
    }
}

impl std::fmt::Debug for AggregateIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateIndex").finish_non_exhaustive()
    }
}
