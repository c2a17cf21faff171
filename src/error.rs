//! Error handling module
//!
//! Centralized error taxonomy for the store. Every component returns
//! [`StoreError`]; the boundary layer maps `NotFound` to the "no data"
//! outcome and everything else to an error buffer.

use std::fmt;

use crate::config::ConfigError;

/// Store-wide Result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse error classification exposed across the C boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    Archived,
    Parse,
    Validation,
    Timeout,
    Integrity,
    VersionNotFound,
    Cancelled,
    Config,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::AlreadyExists => "AlreadyExistsError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::Archived => "ArchivedError",
            ErrorKind::Parse => "ParseError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Integrity => "IntegrityError",
            ErrorKind::VersionNotFound => "VersionNotFoundError",
            ErrorKind::Cancelled => "CancelledError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Aggregate, event or snapshot absent
    #[error("{0} not found")]
    NotFound(String),

    #[error("Aggregate {aggregate_type}/{aggregate_id} already exists")]
    AlreadyExists {
        aggregate_type: String,
        aggregate_id: String,
    },

    /// Version race or re-creation conflict
    #[error("{0}")]
    Conflict(String),

    #[error("Aggregate {aggregate_type}/{aggregate_id} is archived")]
    Archived {
        aggregate_type: String,
        aggregate_id: String,
    },

    /// Malformed JSON supplied by the caller
    #[error("Invalid JSON in {field}: {message}")]
    Parse { field: &'static str, message: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Lock for {key} not acquired after {attempts} attempts of {timeout_ms}ms")]
    Timeout {
        key: String,
        timeout_ms: u64,
        attempts: u32,
    },

    /// Broken hash chain, raised only when a caller asked for a hard failure
    #[error("Hash chain broken at sequence {first_break_sequence}")]
    Integrity { first_break_sequence: u64 },

    #[error("Version {requested} not found: current version is {current}")]
    VersionNotFound { requested: u64, current: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Storage(String),

    #[error("Result could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl StoreError {
    /// Build a not-found error for an aggregate
    pub fn aggregate_not_found(aggregate_type: &str, aggregate_id: &str) -> Self {
        Self::NotFound(format!("Aggregate {}/{}", aggregate_type, aggregate_id))
    }

    pub fn snapshot_not_found(snapshot_id: u64) -> Self {
        Self::NotFound(format!("Snapshot {}", snapshot_id))
    }

    pub fn archived(aggregate_type: &str, aggregate_id: &str) -> Self {
        Self::Archived {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
        }
    }

    pub fn parse(field: &'static str, err: impl fmt::Display) -> Self {
        Self::Parse {
            field,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Archived { .. } => ErrorKind::Archived,
            StoreError::Parse { .. } => ErrorKind::Parse,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Timeout { .. } => ErrorKind::Timeout,
            StoreError::Integrity { .. } => ErrorKind::Integrity,
            StoreError::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            StoreError::Cancelled => ErrorKind::Cancelled,
            StoreError::Config(_) => ErrorKind::Config,
            StoreError::Storage(_) => ErrorKind::Storage,
            StoreError::Serialization(_) | StoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error means "no data" rather than a fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Check if a caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Timeout { .. })
    }

    /// Message in the `"<Kind>: <message>"` form used at the C boundary
    pub fn boundary_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_taxonomy() {
        assert_eq!(ErrorKind::NotFound.to_string(), "NotFoundError");
        assert_eq!(ErrorKind::Parse.as_str(), "ParseError");
        assert_eq!(ErrorKind::Timeout.as_str(), "TimeoutError");
    }

    #[test]
    fn test_not_found_is_distinguished() {
        let err = StoreError::aggregate_not_found("order", "A1");
        assert!(err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("order/A1"));

        let err = StoreError::archived("order", "A1");
        assert!(!err.is_not_found());
        assert_eq!(err.kind(), ErrorKind::Archived);
    }

    #[test]
    fn test_retryable_errors() {
        let conflict = StoreError::Conflict("sequence 3 already claimed".to_string());
        assert!(conflict.is_retryable());

        let timeout = StoreError::Timeout {
            key: "order/A1".to_string(),
            timeout_ms: 10,
            attempts: 3,
        };
        assert!(timeout.is_retryable());

        assert!(!StoreError::Validation("empty id".to_string()).is_retryable());
    }

    #[test]
    fn test_boundary_message_carries_kind() {
        let err = StoreError::parse("options", "expected value at line 1 column 1");
        let message = err.boundary_message();
        assert!(message.starts_with("ParseError: "));
        assert!(message.contains("options"));
    }

    #[test]
    fn test_boundary_message_does_not_repeat_kind() {
        let err = StoreError::Conflict("sequence 3 already claimed".to_string());
        assert_eq!(err.boundary_message(), "ConflictError: sequence 3 already claimed");

        let err = StoreError::Storage("disk full".to_string());
        assert_eq!(err.boundary_message(), "StorageError: disk full");

        let err = StoreError::Config(ConfigError::NotAnObject);
        let message = err.boundary_message();
        assert!(message.starts_with("ConfigError: "));
        assert!(!message.contains("Configuration error"));
    }
}
