//! Event Store Client
//!
//! The operation surface. Each mutating operation validates its input,
//! takes the aggregate's lock, checks the index, appends to the log and
//! updates the index before the lock is released. Reads never take the
//! lock; they work from the record's version at the time of the call.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::options::{
    self, AppendOptions, ArchiveOptions, CreateOptions, CreateSnapshotOptions, EventOptions,
    GetSnapshotOptions, ListAggregatesOptions, ListEventsOptions, ListSnapshotsOptions,
    ProjectOptions,
};
use crate::aggregate::{parse_sort, AggregateIndex, AggregateListQuery, AggregateRecord, CreatePlan};
use crate::audit::{VerificationReport, Verifier};
use crate::cancel::CancelToken;
use crate::config::StoreConfig;
use crate::domain::{AggregateKey, Event, EventKind, NewEvent};
use crate::error::{StoreError, StoreResult};
use crate::event_store::{EventLog, EventQuery, EventStorage, InMemoryStorage, SortOrder};
use crate::lock_manager::LockManager;
use crate::pagination::{self, Page};
use crate::projection::{select_fields, ProjectedState, ReducerRegistry, StateProjector};
use crate::snapshot::{Snapshot, SnapshotListQuery, SnapshotManager};

/// An aggregate record together with its projected state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateView {
    #[serde(flatten)]
    pub record: AggregateRecord,
    pub state: Value,
}

// =========================================================================
// Builder
// =========================================================================

#[derive(Default)]
pub struct EventStoreClientBuilder {
    config: Option<StoreConfig>,
    storage: Option<Arc<dyn EventStorage>>,
    reducers: ReducerRegistry,
}

impl EventStoreClientBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Substitute the storage backend (defaults to in-memory)
    pub fn storage(mut self, storage: Arc<dyn EventStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn reducers(mut self, reducers: ReducerRegistry) -> Self {
        self.reducers = reducers;
        self
    }

    pub fn build(self) -> EventStoreClient {
        let config = self.config.unwrap_or_default();
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));

        let log = EventLog::new(Arc::clone(&storage), config.list_batch_size);
        let index = AggregateIndex::new(Arc::clone(&storage));
        let projector = StateProjector::new(
            Arc::clone(&storage),
            log.clone(),
            Arc::new(self.reducers),
        );
        let verifier = Verifier::new(log.clone());
        let snapshots = SnapshotManager::new(
            storage,
            index.clone(),
            projector.clone(),
            verifier.clone(),
        );

        EventStoreClient {
            locks: LockManager::from_config(&config),
            config: Arc::new(config),
            log,
            index,
            projector,
            snapshots,
            verifier,
        }
    }
}

// =========================================================================
// EventStoreClient
// =========================================================================

/// Event store client. Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct EventStoreClient {
    config: Arc<StoreConfig>,
    locks: LockManager,
    log: EventLog,
    index: AggregateIndex,
    projector: StateProjector,
    snapshots: SnapshotManager,
    verifier: Verifier,
}

impl EventStoreClient {
    /// In-memory client with the given configuration
    pub fn new(config: StoreConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> EventStoreClientBuilder {
        EventStoreClientBuilder::default()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// List aggregate records. An empty `aggregate_type` lists every type.
    pub async fn list_aggregates(
        &self,
        aggregate_type: &str,
        options: Option<Value>,
    ) -> StoreResult<Page<AggregateRecord>> {
        let opts: ListAggregatesOptions = options::decode(options)?;

        let query = AggregateListQuery {
            aggregate_type: Some(aggregate_type.to_string()).filter(|t| !t.trim().is_empty()),
            include_archived: opts.include_archived,
            archived_only: opts.archived_only,
            sort: opts.sort.as_deref().map(parse_sort).unwrap_or_default(),
            offset: pagination::decode_offset(opts.cursor.as_deref())?,
            take: self.config.page_size(opts.take),
        };

        let page = self.index.list(&query)?;
        tracing::debug!(
            aggregate_type,
            returned = page.items.len(),
            has_more = page.next_cursor.is_some(),
            "Aggregates listed"
        );
        Ok(page)
    }

    /// Record and current state of one aggregate
    pub async fn get_aggregate(&self, aggregate_type: &str, aggregate_id: &str) -> StoreResult<AggregateView> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let record = self.index.get(&key)?;
        let projected = self.projector.project(&record, None, true, None)?;
        Ok(AggregateView {
            record,
            state: projected.state,
        })
    }

    /// Selected fields of the current state. No fields selects everything.
    pub async fn select_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        fields: Option<Value>,
    ) -> StoreResult<Value> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let fields = options::decode_fields(fields)?;

        let record = self.index.get(&key)?;
        let projected = self.projector.project(&record, None, true, None)?;
        if fields.is_empty() {
            return Ok(projected.state);
        }
        Ok(select_fields(&projected.state, &fields))
    }

    /// Project state at a version (`options.version`, default current)
    pub async fn project_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<Value>,
    ) -> StoreResult<ProjectedState> {
        self.project_aggregate_cancellable(aggregate_type, aggregate_id, options, None)
            .await
    }

    pub async fn project_aggregate_cancellable(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<Value>,
        cancel: Option<CancelToken>,
    ) -> StoreResult<ProjectedState> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: ProjectOptions = options::decode(options)?;

        let record = self.index.get(&key)?;
        self.projector
            .project(&record, opts.version, opts.use_snapshots, cancel)
    }

    /// Start a new aggregate with its first event
    pub async fn create_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: Option<Value>,
    ) -> StoreResult<AggregateView> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: CreateOptions = options::decode(options)?;
        let new_event = build_event(event_type, EventKind::Create, opts.payload, opts.event)?;
        let state = new_event.payload.clone();

        let _guard = self.locks.acquire(&key).await?;
        self.index.reconcile(&self.log, &key)?;

        let existing = match self.index.prepare_create(&key, opts.resurrect)? {
            CreatePlan::New => None,
            CreatePlan::Resurrect(record) => {
                tracing::info!(aggregate = %key, "Resurrecting archived aggregate");
                Some(record)
            }
        };

        let event = self.log.append(&key, new_event)?;
        let record = self.index.next_record(existing, &event);
        self.commit_record(&key, &record);

        tracing::info!(
            aggregate = %key,
            event_type,
            version = record.current_version,
            "Aggregate created"
        );

        Ok(AggregateView { record, state })
    }

    /// Append an event to an existing, active aggregate
    pub async fn append_event(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        options: Option<Value>,
    ) -> StoreResult<Event> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: AppendOptions = options::decode(options)?;
        let new_event = build_event(event_type, EventKind::Append, opts.payload, opts.event)?;

        self.mutate(&key, new_event).await
    }

    /// Append a merge-patch event to an existing, active aggregate
    pub async fn patch_event(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        patch: Option<Value>,
        options: Option<Value>,
    ) -> StoreResult<Event> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: EventOptions = options::decode(options)?;
        let new_event = build_event(event_type, EventKind::Patch, patch, opts)?;

        self.mutate(&key, new_event).await
    }

    async fn mutate(&self, key: &AggregateKey, new_event: NewEvent) -> StoreResult<Event> {
        let _guard = self.locks.acquire(key).await?;
        self.index.reconcile(&self.log, key)?;

        let record = self.index.get_active(key)?;
        let event = self.log.append(key, new_event)?;
        self.commit_record(key, &self.index.next_record(Some(record), &event));

        Ok(event)
    }

    /// Store the record for an event the log has already committed.
    ///
    /// The event is durable at this point, so a failed index write must not
    /// fail the call. The record is rebuilt from the log instead; if that
    /// fails too, the next mutation of this key reconciles it.
    fn commit_record(&self, key: &AggregateKey, record: &AggregateRecord) {
        let Err(err) = self.index.save(record) else {
            return;
        };
        tracing::warn!(
            aggregate = %key,
            version = record.current_version,
            error = %err,
            "Index write failed after event commit, rebuilding record"
        );
        if let Err(err) = self.index.rebuild(&self.log, key) {
            tracing::error!(
                aggregate = %key,
                error = %err,
                "Aggregate record left behind event log"
            );
        }
    }

    /// Archive or restore an aggregate. Events and version are untouched.
    pub async fn set_archive(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        archived: bool,
        options: Option<Value>,
    ) -> StoreResult<AggregateRecord> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: ArchiveOptions = options::decode(options)?;

        let _guard = self.locks.acquire(&key).await?;
        self.index.reconcile(&self.log, &key)?;
        let record = self.index.set_archived(&key, archived, opts.note)?;

        tracing::info!(aggregate = %key, archived, "Aggregate archive flag set");
        Ok(record)
    }

    /// Recompute an aggregate's record from its event log
    pub async fn rebuild_index(&self, aggregate_type: &str, aggregate_id: &str) -> StoreResult<AggregateRecord> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;

        let _guard = self.locks.acquire(&key).await?;
        self.index
            .rebuild(&self.log, &key)?
            .ok_or_else(|| StoreError::aggregate_not_found(aggregate_type, aggregate_id))
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub async fn list_events(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<Value>,
    ) -> StoreResult<Page<Event>> {
        self.list_events_cancellable(aggregate_type, aggregate_id, options, None)
            .await
    }

    /// List events in pages. The listing is bounded by the version observed
    /// at the start of the call.
    ///
    /// The cursor is the last sequence number returned; the next page starts
    /// after it in the requested order, so events appended between pages
    /// never repeat or shift a page.
    pub async fn list_events_cancellable(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<Value>,
        cancel: Option<CancelToken>,
    ) -> StoreResult<Page<Event>> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: ListEventsOptions = options::decode(options)?;

        let order = match opts.order.as_deref() {
            None => SortOrder::Ascending,
            Some(raw) => SortOrder::parse(raw).ok_or_else(|| {
                StoreError::Validation(format!("order must be asc or desc, got {}", raw))
            })?,
        };
        let after = pagination::decode_sequence(opts.cursor.as_deref())?;
        let take = self.config.page_size(opts.take);

        let (mut from_version, mut to_version) = (opts.from_version, opts.to_version);
        match (after, order) {
            (None, _) => {}
            (Some(last), SortOrder::Ascending) => {
                let next = last.saturating_add(1);
                from_version = Some(from_version.map_or(next, |from| from.max(next)));
            }
            (Some(last), SortOrder::Descending) => {
                if last <= 1 {
                    return Ok(Page {
                        items: Vec::new(),
                        next_cursor: None,
                    });
                }
                let next = last - 1;
                to_version = Some(to_version.map_or(next, |to| to.min(next)));
            }
        }

        let record = self.index.get(&key)?;
        let query = EventQuery {
            from_version,
            to_version,
            limit: Some(take.saturating_add(1)),
            order,
        };

        let mut events = self
            .log
            .stream(&key, &query, record.current_version, cancel)
            .collect::<StoreResult<Vec<_>>>()?;

        let has_more = events.len() > take;
        events.truncate(take);
        let next_cursor = has_more
            .then(|| events.last().map(|e| e.sequence_number.to_string()))
            .flatten();

        tracing::debug!(aggregate = %key, returned = events.len(), has_more, "Events listed");
        Ok(Page {
            items: events,
            next_cursor,
        })
    }

    // =========================================================================
    // Verification
    // =========================================================================

    pub async fn verify_aggregate(&self, aggregate_type: &str, aggregate_id: &str) -> StoreResult<VerificationReport> {
        self.verify_aggregate_cancellable(aggregate_type, aggregate_id, None)
            .await
    }

    /// Walk the hash chain. A broken chain is reported in the result, not
    /// as an error.
    pub async fn verify_aggregate_cancellable(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        cancel: Option<CancelToken>,
    ) -> StoreResult<VerificationReport> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let record = self.index.get(&key)?;
        self.verifier.verify(&record, cancel)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub async fn create_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        options: Option<Value>,
    ) -> StoreResult<Snapshot> {
        let key = AggregateKey::new(aggregate_type, aggregate_id)?;
        let opts: CreateSnapshotOptions = options::decode(options)?;

        let _guard = self.locks.acquire(&key).await?;
        self.index.reconcile(&self.log, &key)?;
        let record = self.index.get_active(&key)?;
        self.snapshots
            .create_snapshot(&record, opts.comment, opts.verify)
    }

    pub async fn list_snapshots(&self, options: Option<Value>) -> StoreResult<Page<Snapshot>> {
        let opts: ListSnapshotsOptions = options::decode(options)?;

        let query = SnapshotListQuery {
            aggregate_type: opts.aggregate_type,
            aggregate_id: opts.aggregate_id,
            offset: pagination::decode_offset(opts.cursor.as_deref())?,
            take: self.config.page_size(opts.take),
        };
        self.snapshots.list_snapshots(&query)
    }

    pub async fn get_snapshot(&self, snapshot_id: u64, options: Option<Value>) -> StoreResult<Snapshot> {
        let opts: GetSnapshotOptions = options::decode(options)?;

        let snapshot = self.snapshots.get_snapshot(snapshot_id)?;
        if opts.include_state {
            Ok(snapshot)
        } else {
            Ok(snapshot.without_state())
        }
    }
}

/// Validate an event type and payload and attach note and metadata
fn build_event(
    event_type: &str,
    kind: EventKind,
    payload: Option<Value>,
    extra: EventOptions,
) -> StoreResult<NewEvent> {
    Ok(NewEvent::new(event_type, kind, payload.unwrap_or(Value::Null))?
        .with_note(extra.note)
        .with_attributes(extra.metadata))
}
