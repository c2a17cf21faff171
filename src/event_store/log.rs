//! Event Log
//!
//! Append-only, per-aggregate hash chain. Appending assigns the next
//! sequence number and links the new event to its predecessor's digest.
//! Listing returns a lazy [`EventStream`] that pulls from storage in batches.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::EventStorage;
use crate::cancel::{self, CancelToken};
use crate::domain::{chain_hash, AggregateKey, Digest, Event, EventMetadata, NewEvent};
use crate::error::StoreResult;

/// Direction of an event listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Parse `asc`/`desc` (and their long forms); anything else is rejected
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Some(SortOrder::Ascending),
            "desc" | "descending" => Some(SortOrder::Descending),
            _ => None,
        }
    }
}

/// Bounds of an event listing. Versions are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub from_version: Option<u64>,
    pub to_version: Option<u64>,
    pub limit: Option<usize>,
    pub order: SortOrder,
}

impl EventQuery {
    pub fn range(from_version: u64, to_version: u64) -> Self {
        Self {
            from_version: Some(from_version),
            to_version: Some(to_version),
            ..Self::default()
        }
    }
}

/// Event log over a storage backend
#[derive(Clone)]
pub struct EventLog {
    storage: Arc<dyn EventStorage>,
    batch_size: usize,
}

impl EventLog {
    pub fn new(storage: Arc<dyn EventStorage>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
        }
    }

    // =========================================================================
    // append
    // =========================================================================

    /// Append an event to an aggregate's chain.
    ///
    /// The caller must hold the aggregate's mutation lock; the storage
    /// backend still rejects a sequence number that was already claimed.
    pub fn append(&self, key: &AggregateKey, new_event: NewEvent) -> StoreResult<Event> {
        let (sequence_number, prior_hash) = match self.storage.last_event(key)? {
            Some(last) => (last.sequence_number + 1, last.own_hash),
            None => (1, Digest::GENESIS),
        };
        let own_hash = chain_hash(&prior_hash, &new_event.payload, sequence_number);

        let event = Event {
            aggregate_type: key.aggregate_type.clone(),
            aggregate_id: key.aggregate_id.clone(),
            event_type: new_event.event_type,
            kind: new_event.kind,
            sequence_number,
            payload: new_event.payload,
            prior_hash,
            own_hash,
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                created_at: Utc::now(),
                note: new_event.note,
                attributes: new_event.attributes,
            },
        };

        self.storage.insert_event(event.clone())?;

        tracing::debug!(
            aggregate = %key,
            sequence_number,
            event_type = %event.event_type,
            kind = %event.kind,
            "Event appended"
        );

        Ok(event)
    }

    // =========================================================================
    // list
    // =========================================================================

    /// Open a lazy listing bounded by `current_version`.
    ///
    /// `current_version` is the consistency point observed by the caller;
    /// events appended afterwards are not yielded, so the stream is finite.
    pub fn stream(
        &self,
        key: &AggregateKey,
        query: &EventQuery,
        current_version: u64,
        cancel: Option<CancelToken>,
    ) -> EventStream {
        let low = query.from_version.unwrap_or(1).max(1);
        let high = query
            .to_version
            .map_or(current_version, |to| to.min(current_version));

        EventStream {
            storage: Arc::clone(&self.storage),
            key: key.clone(),
            low,
            high,
            order: query.order,
            limit: query.limit,
            batch_size: self.batch_size,
            cancel,
            cursor: None,
            buffer: VecDeque::new(),
            yielded: 0,
            finished: low > high,
        }
    }

    /// Read `from..=to` eagerly in ascending order
    pub fn read_range(
        &self,
        key: &AggregateKey,
        from_version: u64,
        to_version: u64,
        cancel: Option<CancelToken>,
    ) -> StoreResult<Vec<Event>> {
        self.stream(key, &EventQuery::range(from_version, to_version), to_version, cancel)
            .collect()
    }

    pub fn last_event(&self, key: &AggregateKey) -> StoreResult<Option<Event>> {
        self.storage.last_event(key)
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Lazy, finite listing of one aggregate's events
///
/// Each `next()` is served from an in-memory batch; when the batch runs dry
/// the cancellation token is checked and the next batch is read. A
/// cancelled stream yields a single `Err(Cancelled)` and then ends.
pub struct EventStream {
    storage: Arc<dyn EventStorage>,
    key: AggregateKey,
    low: u64,
    high: u64,
    order: SortOrder,
    limit: Option<usize>,
    batch_size: usize,
    cancel: Option<CancelToken>,
    /// Next sequence number to fetch from (inclusive)
    cursor: Option<u64>,
    buffer: VecDeque<Event>,
    yielded: usize,
    finished: bool,
}

impl EventStream {
    /// A fresh stream over the same bounds. Listing has no side effects, so
    /// restarting always yields the same events.
    pub fn restart(&self) -> EventStream {
        EventStream {
            storage: Arc::clone(&self.storage),
            key: self.key.clone(),
            low: self.low,
            high: self.high,
            order: self.order,
            limit: self.limit,
            batch_size: self.batch_size,
            cancel: self.cancel.clone(),
            cursor: None,
            buffer: VecDeque::new(),
            yielded: 0,
            finished: self.low > self.high,
        }
    }

    fn fill(&mut self) -> StoreResult<()> {
        cancel::check(self.cancel.as_ref())?;

        let batch = self.batch_size as u64;
        let mut events = match self.order {
            SortOrder::Ascending => {
                let from = self.cursor.unwrap_or(self.low);
                if from > self.high {
                    self.finished = true;
                    return Ok(());
                }
                let to = from.saturating_add(batch - 1).min(self.high);
                self.cursor = Some(to + 1);
                if to == self.high {
                    self.finished = true;
                }
                self.storage.read_events(&self.key, from, to)?
            }
            SortOrder::Descending => {
                let to = self.cursor.unwrap_or(self.high);
                if to < self.low || to == 0 {
                    self.finished = true;
                    return Ok(());
                }
                let from = to.saturating_sub(batch - 1).max(self.low);
                if from == self.low {
                    self.finished = true;
                } else {
                    self.cursor = Some(from - 1);
                }
                self.storage.read_events(&self.key, from, to)?
            }
        };

        if self.order == SortOrder::Descending {
            events.reverse();
        }
        self.buffer.extend(events);
        Ok(())
    }
}

impl Iterator for EventStream {
    type Item = StoreResult<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            return None;
        }

        while self.buffer.is_empty() {
            if self.finished {
                return None;
            }
            if let Err(err) = self.fill() {
                self.finished = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }

        self.yielded += 1;
        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;
    use crate::error::StoreError;
    use crate::event_store::InMemoryStorage;
    use serde_json::json;

    fn log_with_events(count: u64, batch_size: usize) -> (EventLog, AggregateKey) {
        let log = EventLog::new(Arc::new(InMemoryStorage::new()), batch_size);
        let key = AggregateKey::new("order", "A1").unwrap();
        for n in 1..=count {
            let event = NewEvent::new("ItemAdded", EventKind::Append, json!({ "n": n })).unwrap();
            log.append(&key, event).unwrap();
        }
        (log, key)
    }

    fn seqs(stream: EventStream) -> Vec<u64> {
        stream.map(|e| e.unwrap().sequence_number).collect()
    }

    #[test]
    fn test_append_assigns_contiguous_sequence() {
        let (log, key) = log_with_events(4, 2);
        let all = seqs(log.stream(&key, &EventQuery::default(), 4, None));
        assert_eq!(all, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_append_chains_hashes() {
        let (log, key) = log_with_events(3, 10);
        let events: Vec<Event> = log.read_range(&key, 1, 3, None).unwrap();

        assert_eq!(events[0].prior_hash, Digest::GENESIS);
        assert_eq!(events[1].prior_hash, events[0].own_hash);
        assert_eq!(events[2].prior_hash, events[1].own_hash);
        assert_eq!(
            events[2].own_hash,
            chain_hash(&events[1].own_hash, &events[2].payload, 3)
        );
    }

    #[test]
    fn test_stream_bounds_and_limit() {
        let (log, key) = log_with_events(10, 3);

        let query = EventQuery {
            from_version: Some(3),
            to_version: Some(8),
            limit: Some(4),
            order: SortOrder::Ascending,
        };
        assert_eq!(seqs(log.stream(&key, &query, 10, None)), vec![3, 4, 5, 6]);

        let query = EventQuery {
            order: SortOrder::Descending,
            to_version: Some(7),
            ..EventQuery::default()
        };
        assert_eq!(seqs(log.stream(&key, &query, 10, None)), vec![7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_stream_stops_at_consistency_point() {
        let (log, key) = log_with_events(5, 2);
        let stream = log.stream(&key, &EventQuery::default(), 3, None);
        assert_eq!(seqs(stream), vec![1, 2, 3]);
    }

    #[test]
    fn test_stream_is_restartable() {
        let (log, key) = log_with_events(5, 2);
        let mut stream = log.stream(&key, &EventQuery::default(), 5, None);
        let _ = stream.next();
        let _ = stream.next();

        assert_eq!(seqs(stream.restart()), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_ranges() {
        let (log, key) = log_with_events(2, 2);
        assert!(seqs(log.stream(&key, &EventQuery::range(3, 9), 2, None)).is_empty());
        assert!(seqs(log.stream(&key, &EventQuery::default(), 0, None)).is_empty());
    }

    #[test]
    fn test_cancelled_stream_yields_error_once() {
        let (log, key) = log_with_events(6, 2);
        let token = CancelToken::new();
        let mut stream = log.stream(&key, &EventQuery::default(), 6, Some(token.clone()));

        assert_eq!(stream.next().unwrap().unwrap().sequence_number, 1);
        assert_eq!(stream.next().unwrap().unwrap().sequence_number, 2);
        token.cancel();

        assert!(matches!(stream.next(), Some(Err(StoreError::Cancelled))));
        assert!(stream.next().is_none());
    }
}
