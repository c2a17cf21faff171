//! Aggregate identity
//!
//! `(aggregate_type, aggregate_id)` pair, validated at construction so an
//! empty identifier can never reach storage.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateKey {
    pub aggregate_type: String,
    pub aggregate_id: String,
}

impl AggregateKey {
    /// Create a key, rejecting blank identifiers
    pub fn new(aggregate_type: impl Into<String>, aggregate_id: impl Into<String>) -> StoreResult<Self> {
        let aggregate_type = aggregate_type.into();
        let aggregate_id = aggregate_id.into();
        require_identifier("aggregate_type", &aggregate_type)?;
        require_identifier("aggregate_id", &aggregate_id)?;
        Ok(Self {
            aggregate_type,
            aggregate_id,
        })
    }

    pub fn parts(&self) -> (&str, &str) {
        (&self.aggregate_type, &self.aggregate_id)
    }
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.aggregate_id)
    }
}

/// Reject empty or whitespace-only identifiers
pub fn require_identifier(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} must not be empty", field)));
    }
    if value.chars().any(char::is_control) {
        return Err(StoreError::Validation(format!(
            "{} must not contain control characters",
            field
        )));
    }
    Ok(())
}
