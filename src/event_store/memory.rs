//! In-memory storage backend

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::EventStorage;
use crate::aggregate::AggregateRecord;
use crate::domain::{AggregateKey, Event};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<AggregateKey, Vec<Event>>,
    records: BTreeMap<AggregateKey, AggregateRecord>,
    snapshots: BTreeMap<u64, Snapshot>,
    /// Per aggregate: `(as_of_version, snapshot_id)` in order
    lineage: HashMap<AggregateKey, BTreeSet<(u64, u64)>>,
}

/// Process-local storage. Events for one aggregate live in a vector whose
/// index is `sequence_number - 1`.
#[derive(Debug)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
    snapshot_ids: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot_ids: AtomicU64::new(1),
        }
    }

    /// Total number of stored events across all aggregates
    pub fn event_count(&self) -> usize {
        self.tables.read().events.values().map(Vec::len).sum()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStorage for InMemoryStorage {
    fn insert_event(&self, event: Event) -> StoreResult<()> {
        let key = event.key();
        let mut tables = self.tables.write();
        let chain = tables.events.entry(key.clone()).or_default();

        let expected = chain.len() as u64 + 1;
        if event.sequence_number != expected {
            return Err(StoreError::Conflict(format!(
                "sequence {} for {} rejected: next free sequence is {}",
                event.sequence_number, key, expected
            )));
        }

        chain.push(event);
        Ok(())
    }

    fn read_events(&self, key: &AggregateKey, from: u64, to: u64) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read();
        let Some(chain) = tables.events.get(key) else {
            return Ok(Vec::new());
        };

        let from = from.max(1);
        let to = to.min(chain.len() as u64);
        if from > to {
            return Ok(Vec::new());
        }
        Ok(chain[(from - 1) as usize..to as usize].to_vec())
    }

    fn last_event(&self, key: &AggregateKey) -> StoreResult<Option<Event>> {
        Ok(self
            .tables
            .read()
            .events
            .get(key)
            .and_then(|chain| chain.last().cloned()))
    }

    fn upsert_record(&self, record: AggregateRecord) -> StoreResult<()> {
        self.tables.write().records.insert(record.key(), record);
        Ok(())
    }

    fn record(&self, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>> {
        Ok(self.tables.read().records.get(key).cloned())
    }

    fn records(&self, aggregate_type: Option<&str>) -> StoreResult<Vec<AggregateRecord>> {
        let tables = self.tables.read();
        Ok(tables
            .records
            .values()
            .filter(|r| aggregate_type.map_or(true, |t| r.aggregate_type == t))
            .cloned()
            .collect())
    }

    fn next_snapshot_id(&self) -> StoreResult<u64> {
        Ok(self.snapshot_ids.fetch_add(1, Ordering::SeqCst))
    }

    fn insert_snapshot(&self, snapshot: Snapshot) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if tables.snapshots.contains_key(&snapshot.snapshot_id) {
            return Err(StoreError::Conflict(format!(
                "snapshot id {} already used",
                snapshot.snapshot_id
            )));
        }
        tables
            .lineage
            .entry(snapshot.key())
            .or_default()
            .insert((snapshot.as_of_version, snapshot.snapshot_id));
        tables.snapshots.insert(snapshot.snapshot_id, snapshot);
        Ok(())
    }

    fn snapshot(&self, snapshot_id: u64) -> StoreResult<Option<Snapshot>> {
        Ok(self.tables.read().snapshots.get(&snapshot_id).cloned())
    }

    fn latest_snapshot_at_or_below(
        &self,
        key: &AggregateKey,
        version: u64,
    ) -> StoreResult<Option<Snapshot>> {
        let tables = self.tables.read();
        let Some(lineage) = tables.lineage.get(key) else {
            return Ok(None);
        };
        Ok(lineage
            .range(..=(version, u64::MAX))
            .next_back()
            .and_then(|(_, snapshot_id)| tables.snapshots.get(snapshot_id))
            .cloned())
    }

    fn snapshots(
        &self,
        aggregate_type: Option<&str>,
        aggregate_id: Option<&str>,
    ) -> StoreResult<Vec<Snapshot>> {
        let tables = self.tables.read();
        Ok(tables
            .snapshots
            .values()
            .filter(|s| aggregate_type.map_or(true, |t| s.aggregate_type == t))
            .filter(|s| aggregate_id.map_or(true, |id| s.aggregate_id == id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{chain_hash, Digest, EventKind, EventMetadata};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(seq: u64) -> Event {
        let payload = json!({ "n": seq });
        Event {
            aggregate_type: "order".to_string(),
            aggregate_id: "A1".to_string(),
            event_type: "ItemAdded".to_string(),
            kind: EventKind::Append,
            sequence_number: seq,
            own_hash: chain_hash(&Digest::GENESIS, &payload, seq),
            payload,
            prior_hash: Digest::GENESIS,
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                created_at: Utc::now(),
                note: None,
                attributes: None,
            },
        }
    }

    fn key() -> AggregateKey {
        AggregateKey::new("order", "A1").unwrap()
    }

    #[test]
    fn test_insert_and_read_range() {
        let storage = InMemoryStorage::new();
        for seq in 1..=5 {
            storage.insert_event(event(seq)).unwrap();
        }

        let events = storage.read_events(&key(), 2, 4).unwrap();
        let seqs: Vec<u64> = events.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![2, 3, 4]);

        assert_eq!(storage.read_events(&key(), 0, 100).unwrap().len(), 5);
        assert!(storage.read_events(&key(), 6, 9).unwrap().is_empty());
        assert_eq!(storage.event_count(), 5);
    }

    #[test]
    fn test_duplicate_sequence_is_conflict() {
        let storage = InMemoryStorage::new();
        storage.insert_event(event(1)).unwrap();

        let err = storage.insert_event(event(1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_gap_is_conflict() {
        let storage = InMemoryStorage::new();
        let err = storage.insert_event(event(2)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(storage.last_event(&key()).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_ids_are_monotonic() {
        let storage = InMemoryStorage::new();
        let a = storage.next_snapshot_id().unwrap();
        let b = storage.next_snapshot_id().unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    fn snapshot_of(snapshot_id: u64, as_of_version: u64) -> Snapshot {
        Snapshot {
            snapshot_id,
            aggregate_type: "order".to_string(),
            aggregate_id: "A1".to_string(),
            as_of_version,
            projected_state: json!({ "v": as_of_version }),
            chain_head: Digest::GENESIS,
            created_at: Utc::now(),
            comment: None,
        }
    }

    #[test]
    fn test_latest_snapshot_at_or_below() {
        let storage = InMemoryStorage::new();
        storage.insert_snapshot(snapshot_of(1, 5)).unwrap();
        storage.insert_snapshot(snapshot_of(2, 10)).unwrap();
        storage.insert_snapshot(snapshot_of(3, 5)).unwrap();

        let pick = |version| {
            storage
                .latest_snapshot_at_or_below(&key(), version)
                .unwrap()
                .map(|s| s.snapshot_id)
        };
        assert_eq!(pick(4), None);
        assert_eq!(pick(5), Some(3));
        assert_eq!(pick(9), Some(3));
        assert_eq!(pick(10), Some(2));
        assert_eq!(pick(u64::MAX), Some(2));

        let other = AggregateKey::new("order", "B2").unwrap();
        assert!(storage.latest_snapshot_at_or_below(&other, 10).unwrap().is_none());
    }
}
