//! Storage backend
//!
//! The seam between the store's logic and where bytes live. The in-memory
//! backend is the default; tests substitute wrappers to inject faults.

use crate::aggregate::AggregateRecord;
use crate::domain::{AggregateKey, Event};
use crate::error::StoreResult;
use crate::snapshot::Snapshot;

/// Persistence for events, aggregate records and snapshots
///
/// Implementations must be safe to share between threads. Event insertion
/// must reject any sequence number other than `last + 1` for that aggregate
/// with `StoreError::Conflict`; that check is the last line of defence
/// against two writers racing on one chain.
pub trait EventStorage: Send + Sync {
    /// Store an event at its sequence number
    fn insert_event(&self, event: Event) -> StoreResult<()>;

    /// Events with `from <= sequence_number <= to`, ascending
    fn read_events(&self, key: &AggregateKey, from: u64, to: u64) -> StoreResult<Vec<Event>>;

    /// Latest stored event for an aggregate
    fn last_event(&self, key: &AggregateKey) -> StoreResult<Option<Event>>;

    /// Insert or replace an aggregate record
    fn upsert_record(&self, record: AggregateRecord) -> StoreResult<()>;

    fn record(&self, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>>;

    /// All records, optionally restricted to one aggregate type, in key order
    fn records(&self, aggregate_type: Option<&str>) -> StoreResult<Vec<AggregateRecord>>;

    /// Reserve the next snapshot id (monotonic, starting at 1)
    fn next_snapshot_id(&self) -> StoreResult<u64>;

    fn insert_snapshot(&self, snapshot: Snapshot) -> StoreResult<()>;

    fn snapshot(&self, snapshot_id: u64) -> StoreResult<Option<Snapshot>>;

    /// Newest snapshot of `key` with `as_of_version <= version`; ties on
    /// version go to the highest snapshot id
    fn latest_snapshot_at_or_below(
        &self,
        key: &AggregateKey,
        version: u64,
    ) -> StoreResult<Option<Snapshot>>;

    /// Snapshots matching the optional type/id filters, ordered by id
    fn snapshots(
        &self,
        aggregate_type: Option<&str>,
        aggregate_id: Option<&str>,
    ) -> StoreResult<Vec<Snapshot>>;
}
