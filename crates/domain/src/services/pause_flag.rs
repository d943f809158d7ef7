//! Persisted switch that makes the webhook acknowledge deliveries without
//! processing them.

use std::sync::Arc;

use tracing::{info, warn};

use super::optimistic::RetryPolicy;
use super::table_store::TableStore;
use crate::error::EngineError;
use crate::models::{tables, TableEntity};

pub const PAUSE_PARTITION_KEY: &str = "Webhook";
pub const PAUSE_ROW_KEY: &str = "Pause";
pub const IS_PAUSED: &str = "IsPaused";

#[derive(Clone)]
pub struct PauseFlag {
    store: Arc<dyn TableStore>,
    policy: RetryPolicy,
}

impl PauseFlag {
    pub fn new(store: Arc<dyn TableStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// False when the flag was never set or cannot be read.
    pub async fn is_paused(&self) -> bool {
        let read = self
            .policy
            .bounded(
                self.store
                    .get(tables::WEBHOOK_STATE, PAUSE_PARTITION_KEY, PAUSE_ROW_KEY),
            )
            .await;
        match read {
            Ok(Some(entity)) => entity.get_bool(IS_PAUSED).unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Failed to read webhook pause flag, assuming not paused");
                false
            }
        }
    }

    /// Last writer wins.
    pub async fn set_paused(&self, paused: bool) -> Result<(), EngineError> {
        let entity =
            TableEntity::new(PAUSE_PARTITION_KEY, PAUSE_ROW_KEY).with_property(IS_PAUSED, paused);
        self.policy
            .bounded(self.store.upsert(tables::WEBHOOK_STATE, entity))
            .await?;
        info!(paused, "Webhook pause flag updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::StoreError;
    use crate::models::ETag;
    use crate::services::table_store::InMemoryTableStore;

    struct Broken;

    #[async_trait::async_trait]
    impl TableStore for Broken {
        async fn get(&self, _: &str, _: &str, _: &str) -> Result<Option<TableEntity>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn insert(&self, _: &str, _: TableEntity) -> Result<ETag, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn update(&self, _: &str, _: TableEntity, _: &ETag) -> Result<ETag, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn upsert(&self, _: &str, _: TableEntity) -> Result<ETag, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn delete(&self, _: &str, _: &str, _: &str, _: Option<&ETag>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn query_partition_range(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<Vec<TableEntity>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn flag(store: Arc<dyn TableStore>) -> PauseFlag {
        PauseFlag::new(store, RetryPolicy::new(1, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_default_not_paused() {
        assert!(!flag(Arc::new(InMemoryTableStore::new())).is_paused().await);
    }

    #[tokio::test]
    async fn test_set_and_clear() {
        let store = Arc::new(InMemoryTableStore::new());
        let pause = flag(store.clone());

        pause.set_paused(true).await.unwrap();
        assert!(pause.is_paused().await);
        let rows = store.snapshot(tables::WEBHOOK_STATE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].partition_key, "Webhook");
        assert_eq!(rows[0].row_key, "Pause");

        pause.set_paused(false).await.unwrap();
        assert!(!pause.is_paused().await);
    }

    #[tokio::test]
    async fn test_read_failure_means_not_paused() {
        let pause = flag(Arc::new(Broken));
        assert!(!pause.is_paused().await);
        assert!(pause.set_paused(true).await.is_err());
    }
}
