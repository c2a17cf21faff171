//! Operation options
//!
//! Every operation takes an optional JSON object. Absent or `null` means
//! all defaults; a value that does not decode is a `ParseError`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Decode an options value. `None` and `null` give the defaults.
pub fn decode<T>(value: Option<Value>) -> StoreResult<T>
where
    T: DeserializeOwned + Default,
{
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| StoreError::parse("options", e)),
    }
}

/// Decode a select field list: an array of strings, or `null` for none
pub fn decode_fields(value: Option<Value>) -> StoreResult<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(field) if !field.trim().is_empty() => Ok(field),
                other => Err(StoreError::Validation(format!(
                    "fields must be non-empty strings, got {}",
                    other
                ))),
            })
            .collect(),
        Some(_) => Err(StoreError::Validation(
            "fields must be an array of strings".to_string(),
        )),
    }
}

// =========================================================================
// Aggregates
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListAggregatesOptions {
    pub cursor: Option<String>,
    #[serde(alias = "limit")]
    pub take: Option<usize>,
    pub include_archived: bool,
    pub archived_only: bool,
    pub sort: Option<String>,
}

/// Options shared by every event-producing operation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventOptions {
    pub note: Option<String>,
    /// Caller attributes stored beside the event; never hashed
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppendOptions {
    pub payload: Option<Value>,
    #[serde(flatten)]
    pub event: EventOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateOptions {
    pub payload: Option<Value>,
    /// Re-create an archived aggregate instead of failing with a conflict
    pub resurrect: bool,
    #[serde(flatten)]
    pub event: EventOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArchiveOptions {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOptions {
    pub version: Option<u64>,
    /// Start from the newest usable snapshot; `false` forces a full replay
    pub use_snapshots: bool,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            version: None,
            use_snapshots: true,
        }
    }
}

// =========================================================================
// Events
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListEventsOptions {
    pub cursor: Option<String>,
    #[serde(alias = "limit")]
    pub take: Option<usize>,
    pub from_version: Option<u64>,
    pub to_version: Option<u64>,
    /// `asc` (default) or `desc`
    pub order: Option<String>,
}

// =========================================================================
// Snapshots
// =========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateSnapshotOptions {
    pub comment: Option<String>,
    /// Verify the hash chain first and refuse to snapshot a broken one
    pub verify: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListSnapshotsOptions {
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    pub cursor: Option<String>,
    #[serde(alias = "limit")]
    pub take: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GetSnapshotOptions {
    pub include_state: bool,
}

impl Default for GetSnapshotOptions {
    fn default() -> Self {
        Self {
            include_state: true,
        }
    }
}
