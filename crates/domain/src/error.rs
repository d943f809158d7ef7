//! Domain error types.

use std::time::Duration;

use shared::crypto::DecryptionError;
use thiserror::Error;

/// Failures reported by a [`crate::services::TableStore`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Insert rejected because an entity already exists at the key.
    #[error("entity already exists")]
    Conflict,

    /// Conditional write rejected because the concurrency token is stale.
    #[error("concurrency token is stale")]
    PreconditionFailed,

    #[error("entity not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("entity serialization failed: {0}")]
    Serialization(String),
}

/// Failures surfaced by the aggregation engine, key rotation and pause flag.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Optimistic write kept losing to concurrent writers. Safe to retry.
    #[error("contention on {table}/{partition_key}/{row_key} after {attempts} attempts")]
    RetryableContention {
        table: String,
        partition_key: String,
        row_key: String,
        attempts: u32,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(StoreError),

    #[error("pseudonym token could not be decoded: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("secret unavailable: {0}")]
    Secret(String),

    #[error("invalid activity record: {0}")]
    InvalidRecord(String),
}

impl EngineError {
    /// Whether redelivering the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::RetryableContention { .. } | EngineError::StoreUnavailable(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::StoreUnavailable(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        assert_eq!(StoreError::Conflict.to_string(), "entity already exists");
        assert_eq!(
            StoreError::Timeout(Duration::from_millis(250)).to_string(),
            "store operation timed out after 250ms"
        );
    }

    #[test]
    fn test_contention_display() {
        let err = EngineError::RetryableContention {
            table: "DailyAppUsage".to_string(),
            partition_key: "2024-05-01-abc".to_string(),
            row_key: "Word".to_string(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "contention on DailyAppUsage/2024-05-01-abc/Word after 5 attempts"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_decryption_is_not_retryable() {
        let err: EngineError = DecryptionError::Padding.into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_error_converts_to_unavailable() {
        let err: EngineError = StoreError::Unavailable("connection reset".to_string()).into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }
}
