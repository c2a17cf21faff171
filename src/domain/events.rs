//! Domain Events
//!
//! Event definitions for the append-only log.
//! Events are immutable facts; once stored they are never mutated or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{AggregateKey, Digest};
use crate::error::{StoreError, StoreResult};

/// Which operation produced an event, and therefore how it folds into state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Seeds the aggregate state (first event, or a resurrection)
    Create,
    /// JSON merge patch over the current state
    Patch,
    /// Domain event folded by a type-specific reducer
    Append,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Patch => "patch",
            EventKind::Append => "append",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping attached to an event. Never part of the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

/// Stored event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub kind: EventKind,
    pub sequence_number: u64,
    pub payload: Value,
    pub prior_hash: Digest,
    pub own_hash: Digest,
    pub metadata: EventMetadata,
}

impl Event {
    pub fn key(&self) -> AggregateKey {
        AggregateKey {
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
        }
    }
}

/// Event to be appended; sequence number and hashes are assigned by the log
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub kind: EventKind,
    pub payload: Value,
    pub note: Option<String>,
    pub attributes: Option<Value>,
}

impl NewEvent {
    /// Create a new event, checking the payload shape for its kind
    pub fn new(event_type: impl Into<String>, kind: EventKind, payload: Value) -> StoreResult<Self> {
        let event_type = event_type.into();
        super::key::require_identifier("event_type", &event_type)?;

        // Every kind folds into an object state; a null payload means "no fields"
        let payload = match payload {
            Value::Null => Value::Object(Map::new()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(StoreError::Validation(format!(
                    "{} payload must be a JSON object (got {})",
                    kind,
                    json_type_name(&other)
                )))
            }
        };

        Ok(Self {
            event_type,
            kind,
            payload,
            note: None,
            attributes: None,
        })
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn with_attributes(mut self, attributes: Option<Value>) -> Self {
        self.attributes = attributes;
        self
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_defaults_null_payload() {
        let event = NewEvent::new("Created", EventKind::Create, Value::Null).unwrap();
        assert_eq!(event.payload, json!({}));
        assert!(event.note.is_none());
    }

    #[test]
    fn test_new_event_rejects_scalar_payload() {
        let err = NewEvent::new("ItemAdded", EventKind::Append, json!(42)).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(err.to_string().contains("number"));
    }

    #[test]
    fn test_new_event_rejects_blank_type() {
        assert!(NewEvent::new(" ", EventKind::Append, json!({})).is_err());
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_value(EventKind::Patch).unwrap(), json!("patch"));
        assert_eq!(EventKind::Create.to_string(), "create");
    }
}
