use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AggregateKey, Digest};

/// Point-in-time projected state of one aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: u64,
    pub aggregate_type: String,
    pub aggregate_id: String,

    /// Sequence number of the last event folded into `projected_state`
    pub as_of_version: u64,

    pub projected_state: Value,

    /// own_hash of the event at `as_of_version`
    pub chain_head: Digest,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Snapshot {
    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
        }
    }

    /// Copy without the projected state, for listings that only need lineage
    pub fn without_state(&self) -> Self {
        Self {
            snapshot_id: self.snapshot_id,
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
            as_of_version: self.as_of_version,
            projected_state: Value::Null,
            chain_head: self.chain_head,
            created_at: self.created_at,
            comment: self.comment.clone(),
        }
    }
}
