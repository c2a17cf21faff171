//! Aggregate Record
//!
//! Index entry for one aggregate. Derived data: everything except the
//! bookkeeping timestamps can be rebuilt by replaying the event log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AggregateKey, Digest, Event};

/// Lifecycle state of an aggregate that has been created.
/// A key with no record is "uninitialized".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub aggregate_type: String,
    pub aggregate_id: String,

    /// Sequence number of the latest event
    pub current_version: u64,

    /// Soft-delete flag; archived aggregates reject mutations
    pub archived: bool,

    #[serde(default)]
    pub latest_snapshot_version: Option<u64>,

    #[serde(default)]
    pub latest_snapshot_id: Option<u64>,

    /// own_hash of the latest event
    pub head_hash: Digest,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_note: Option<String>,
}

impl AggregateRecord {
    /// Record for an aggregate whose first event was just stored
    pub fn from_first_event(event: &Event) -> Self {
        let now = Utc::now();
        Self {
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            current_version: event.sequence_number,
            archived: false,
            latest_snapshot_version: None,
            latest_snapshot_id: None,
            head_hash: event.own_hash,
            created_at: now,
            updated_at: now,
            archived_at: None,
            archive_note: None,
        }
    }

    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
        }
    }

    pub fn status(&self) -> AggregateStatus {
        if self.archived {
            AggregateStatus::Archived
        } else {
            AggregateStatus::Active
        }
    }

    /// Advance the record past a newly stored event
    pub fn advance(&mut self, event: &Event) {
        self.current_version = event.sequence_number;
        self.head_hash = event.own_hash;
        self.updated_at = Utc::now();
    }
}
