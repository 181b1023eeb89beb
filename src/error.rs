//! Error types for docgraph-core.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias using docgraph-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during graph construction and queries.
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced domain does not exist
    #[error("Unknown domain: {domain_id}")]
    UnknownDomain { domain_id: String },

    /// Referenced node does not exist (or lives in another domain)
    #[error("Unknown node: {node_id}")]
    UnknownNode { node_id: String },

    /// An entity with this identifier already exists
    #[error("Duplicate id: {id}")]
    DuplicateId { id: String },

    /// An edge with the same (source, target, type) already exists in the domain
    #[error("Duplicate edge: {source_id} -[{relationship_type}]-> {target_id}")]
    DuplicateEdge {
        source_id: String,
        target_id: String,
        relationship_type: String,
    },

    /// Edge strength outside [0.0, 1.0]
    #[error("Invalid strength {strength}: must be within [0.0, 1.0]")]
    InvalidStrength { strength: f64 },

    /// I/O, locking or connection failure in the backing store
    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Operation abandoned after its deadline
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Non-retryable storage failure (schema mismatch, malformed SQL)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unknown domain error.
    pub fn unknown_domain(domain_id: impl Into<String>) -> Self {
        Self::UnknownDomain {
            domain_id: domain_id.into(),
        }
    }

    /// Create an unknown node error.
    pub fn unknown_node(node_id: impl Into<String>) -> Self {
        Self::UnknownNode {
            node_id: node_id.into(),
        }
    }

    /// Create a duplicate id error.
    pub fn duplicate_id(id: impl Into<String>) -> Self {
        Self::DuplicateId { id: id.into() }
    }

    /// Create a duplicate edge error.
    pub fn duplicate_edge(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: impl Into<String>,
    ) -> Self {
        Self::DuplicateEdge {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: relationship_type.into(),
        }
    }

    /// Create a store unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Duplicate edges represent idempotent re-processing, not failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DuplicateEdge { .. })
    }

    /// Whether the operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Whether a failed page can be skipped while the rest of the document continues.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::StoreUnavailable { .. } | Self::Internal(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::OperationInterrupted) => Self::Timeout { duration_ms: 0 },
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory
                | ErrorCode::ReadOnly
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt,
            ) => Self::store_unavailable(err.to_string()),
            _ => Self::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::duplicate_edge("a", "b", "contains").is_benign());
        assert!(!Error::unknown_node("a").is_benign());

        assert!(Error::store_unavailable("disk gone").is_retryable());
        assert!(!Error::timeout(10).is_retryable());

        assert!(Error::InvalidStrength { strength: 1.5 }.is_recoverable());
        assert!(Error::timeout(10).is_recoverable());
        assert!(!Error::store_unavailable("disk gone").is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = Error::InvalidStrength { strength: 1.5 };
        assert_eq!(
            err.to_string(),
            "Invalid strength 1.5: must be within [0.0, 1.0]"
        );
        assert_eq!(
            Error::duplicate_edge("n1", "n2", "contains").to_string(),
            "Duplicate edge: n1 -[contains]-> n2"
        );
    }

    #[test]
    fn test_sqlite_error_mapping() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(Error::from(busy), Error::StoreUnavailable { .. }));

        let interrupted = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
            None,
        );
        assert!(matches!(Error::from(interrupted), Error::Timeout { .. }));

        let other = rusqlite::Error::InvalidQuery;
        assert!(matches!(Error::from(other), Error::Storage(_)));
    }
}
