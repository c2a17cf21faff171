//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use eventdbx_native::aggregate::AggregateRecord;
use eventdbx_native::domain::{AggregateKey, Event};
use eventdbx_native::event_store::{EventStorage, InMemoryStorage};
use eventdbx_native::snapshot::Snapshot;
use eventdbx_native::{EventStoreClient, StoreConfig, StoreError, StoreResult};
use parking_lot::RwLock;
use serde_json::Value;

/// Config with short lock timeouts so contention tests finish quickly
pub fn test_config() -> StoreConfig {
    StoreConfig {
        lock_timeout: Duration::from_millis(2_000),
        lock_retries: 2,
        retry_backoff: Duration::from_millis(5),
        list_batch_size: 4,
        ..StoreConfig::default()
    }
}

/// Fresh in-memory store
pub fn setup_store() -> EventStoreClient {
    EventStoreClient::new(test_config())
}

/// Store over a substituted backend
pub fn setup_store_with(storage: Arc<dyn EventStorage>) -> EventStoreClient {
    EventStoreClient::builder()
        .config(test_config())
        .storage(storage)
        .build()
}

// =========================================================================
// FaultyStorage
// =========================================================================

/// In-memory backend whose writes or reads can be made to fail
#[derive(Default)]
pub struct FaultyStorage {
    inner: InMemoryStorage,
    fail_inserts: AtomicBool,
    fail_reads: AtomicBool,
    failing_upserts: AtomicUsize,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` aggregate record writes
    pub fn fail_upserts(&self, count: usize) {
        self.failing_upserts.store(count, Ordering::SeqCst);
    }

    /// Stored events of one aggregate, bypassing the index
    pub fn stored_events(&self, key: &AggregateKey) -> Vec<Event> {
        self.inner.read_events(key, 1, u64::MAX).unwrap_or_default()
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Storage(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

impl EventStorage for FaultyStorage {
    fn insert_event(&self, event: Event) -> StoreResult<()> {
        self.check(&self.fail_inserts, "insert")?;
        self.inner.insert_event(event)
    }

    fn read_events(&self, key: &AggregateKey, from: u64, to: u64) -> StoreResult<Vec<Event>> {
        self.check(&self.fail_reads, "read")?;
        self.inner.read_events(key, from, to)
    }

    fn last_event(&self, key: &AggregateKey) -> StoreResult<Option<Event>> {
        self.inner.last_event(key)
    }

    fn upsert_record(&self, record: AggregateRecord) -> StoreResult<()> {
        let failing = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StoreError::Storage("injected upsert failure".to_string()));
        }
        self.inner.upsert_record(record)
    }

    fn record(&self, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>> {
        self.inner.record(key)
    }

    fn records(&self, aggregate_type: Option<&str>) -> StoreResult<Vec<AggregateRecord>> {
        self.inner.records(aggregate_type)
    }

    fn next_snapshot_id(&self) -> StoreResult<u64> {
        self.inner.next_snapshot_id()
    }

    fn insert_snapshot(&self, snapshot: Snapshot) -> StoreResult<()> {
        self.check(&self.fail_inserts, "insert")?;
        self.inner.insert_snapshot(snapshot)
    }

    fn snapshot(&self, snapshot_id: u64) -> StoreResult<Option<Snapshot>> {
        self.inner.snapshot(snapshot_id)
    }

    fn latest_snapshot_at_or_below(&self, key: &AggregateKey, version: u64) -> StoreResult<Option<Snapshot>> {
        self.inner.latest_snapshot_at_or_below(key, version)
    }

    fn snapshots(&self, aggregate_type: Option<&str>, aggregate_id: Option<&str>) -> StoreResult<Vec<Snapshot>> {
        self.inner.snapshots(aggregate_type, aggregate_id)
    }
}

// =========================================================================
// TamperingStorage
// =========================================================================

/// In-memory backend that rewrites stored payloads out-of-band, the way a
/// corrupted disk or a hostile edit would
#[derive(Default)]
pub struct TamperingStorage {
    inner: InMemoryStorage,
    overrides: RwLock<HashMap<(AggregateKey, u64), Value>>,
}

impl TamperingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the payload of one stored event
    pub fn tamper(&self, key: &AggregateKey, sequence_number: u64, payload: Value) {
        self.overrides
            .write()
            .insert((key.clone(), sequence_number), payload);
    }

    fn apply(&self, mut event: Event) -> Event {
        let key = event.key();
        if let Some(payload) = self.overrides.read().get(&(key, event.sequence_number)) {
            event.payload = payload.clone();
        }
        event
    }
}

impl EventStorage for TamperingStorage {
    fn insert_event(&self, event: Event) -> StoreResult<()> {
        self.inner.insert_event(event)
    }

    fn read_events(&self, key: &AggregateKey, from: u64, to: u64) -> StoreResult<Vec<Event>> {
        Ok(self
            .inner
            .read_events(key, from, to)?
            .into_iter()
            .map(|e| self.apply(e))
            .collect())
    }

    fn last_event(&self, key: &AggregateKey) -> StoreResult<Option<Event>> {
        Ok(self.inner.last_event(key)?.map(|e| self.apply(e)))
    }

    fn upsert_record(&self, record: AggregateRecord) -> StoreResult<()> {
        self.inner.upsert_record(record)
    }

    fn record(&self, key: &AggregateKey) -> StoreResult<Option<AggregateRecord>> {
        self.inner.record(key)
    }

    fn records(&self, aggregate_type: Option<&str>) -> StoreResult<Vec<AggregateRecord>> {
        self.inner.records(aggregate_type)
    }

    fn next_snapshot_id(&self) -> StoreResult<u64> {
        self.inner.next_snapshot_id()
    }

    fn insert_snapshot(&self, snapshot: Snapshot) -> StoreResult<()> {
        self.inner.insert_snapshot(snapshot)
    }

    fn snapshot(&self, snapshot_id: u64) -> StoreResult<Option<Snapshot>> {
        self.inner.snapshot(snapshot_id)
    }

    fn latest_snapshot_at_or_below(&self, key: &AggregateKey, version: u64) -> StoreResult<Option<Snapshot>> {
        self.inner.latest_snapshot_at_or_below(key, version)
    }

    fn snapshots(&self, aggregate_type: Option<&str>, aggregate_id: Option<&str>) -> StoreResult<Vec<Snapshot>> {
        self.inner.snapshots(aggregate_type, aggregate_id)
    }
}
