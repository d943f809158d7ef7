//! Audit log of webhook deliveries.

use std::sync::Arc;

use tracing::warn;

use super::optimistic::RetryPolicy;
use super::table_store::TableStore;
use crate::models::{tables, WebhookTriggerEvent};

#[derive(Clone)]
pub struct TriggerLog {
    store: Arc<dyn TableStore>,
    policy: RetryPolicy,
}

impl TriggerLog {
    pub fn new(store: Arc<dyn TableStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Best effort: a failed write is logged and otherwise ignored.
    pub async fn record(&self, event: &WebhookTriggerEvent) {
        let written = self
            .policy
            .bounded(self.store.insert(tables::WEBHOOK_TRIGGERS, event.to_entity()))
            .await;
        if let Err(e) = written {
            warn!(event_id = %event.event_id, error = %e, "Failed to record webhook trigger");
        }
    }
}
