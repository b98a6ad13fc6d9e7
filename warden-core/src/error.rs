//! Error type shared by the orchestration layer and its adapters.

use thiserror::Error;
use warden_model::{ModelError, ScanStatus};

#[derive(Error, Debug)]
pub enum WardenError {
    #[error("Tenant not found for broker identity {0}")]
    TenantNotFound(String),

    #[error("No tenant owns namespace {0}")]
    NamespaceNotFound(String),

    #[error("Scan {0} not found")]
    ScanNotFound(String),

    #[error("task_id not set for scan {0}")]
    GroupIdMissing(String),

    #[error("not a valid task group id: {0}")]
    GroupNotFound(String),

    #[error("Unknown probe {0}")]
    UnknownProbe(String),

    #[error("Empty probe list for {0}")]
    EmptyProbeList(String),

    #[error("The lock on {collection} n{id} has already been taken")]
    LockHeld { collection: String, id: String },

    #[error("The lock mode {0} is not available")]
    InvalidLockMode(String),

    #[error("Document {collection} n{id} not present in collection")]
    DocumentNotFound { collection: String, id: String },

    #[error("Invalid status transition {from} -> {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Result sink error: {0}")]
    ResultSink(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Failures a caller may retry later without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WardenError::LockHeld { .. }
                | WardenError::StoreUnavailable(_)
                | WardenError::Broker(_)
                | WardenError::ResultSink(_)
        )
    }

    pub fn is_lock_contention(&self) -> bool {
        matches!(self, WardenError::LockHeld { .. })
    }
}

impl From<ModelError> for WardenError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidId(msg) => WardenError::InvalidId(msg),
            other => WardenError::Internal(other.to_string()),
        }
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for WardenError {
    fn from(err: sqlx::Error) -> Self {
        WardenError::StoreUnavailable(err.to_string())
    }
}

#[cfg(feature = "database")]
impl From<redis::RedisError> for WardenError {
    fn from(err: redis::RedisError) -> Self {
        WardenError::StoreUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        WardenError::ResultSink(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_contention_is_retryable_and_distinct() {
        let err = WardenError::LockHeld {
            collection: "scans".into(),
            id: "42".into(),
        };
        assert!(err.is_retryable());
        assert!(err.is_lock_contention());
        assert!(!WardenError::UnknownProbe("zzz".into()).is_retryable());
        assert!(!WardenError::InvalidLockMode("read".into()).is_lock_contention());
    }

    #[test]
    fn messages_match_task_vocabulary() {
        assert_eq!(
            WardenError::UnknownProbe("zzz".into()).to_string(),
            "Unknown probe zzz"
        );
        assert_eq!(
            WardenError::StoreUnavailable("connection refused".into()).to_string(),
            "Store unavailable: connection refused"
        );
    }
}
