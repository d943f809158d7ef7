//! Counter store adapter: additive counters on top of optimistic writes.

use std::sync::Arc;

use chrono::NaiveDate;
use metrics::counter;
use serde_json::Value;

use super::optimistic::{read_modify_write, RetryPolicy};
use super::table_store::TableStore;
use crate::error::EngineError;
use crate::models::{
    AgentCounter, AggregateCounter, CounterKey, Properties, TableEntity,
    UnhandledHostCounter, UsageCategory, OCCURRENCE_COUNT, TOTAL_INTERACTION_COUNT,
};

#[derive(Clone)]
pub struct CounterStore {
    store: Arc<dyn TableStore>,
    policy: RetryPolicy,
}

impl CounterStore {
    pub fn new(store: Arc<dyn TableStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Adds `delta` to an integer field and overwrites `auxiliary` fields.
    ///
    /// A missing entity starts from zero. Returns the value written. A sum
    /// that does not fit in an `i64` is rejected and nothing is written.
    pub async fn merge_increment(
        &self,
        key: &CounterKey,
        field: &str,
        delta: i64,
        auxiliary: &Properties,
    ) -> Result<i64, EngineError> {
        let mut written = 0;
        read_modify_write(
            self.store.as_ref(),
            &self.policy,
            key.table,
            &key.partition_key,
            &key.row_key,
            |existing| {
                let mut properties = existing.cloned().unwrap_or_default();
                let current = properties.get(field).and_then(Value::as_i64).unwrap_or(0);
                written = current.checked_add(delta).ok_or_else(|| {
                    EngineError::InvalidRecord(format!(
                        "{} on {}/{} would overflow",
                        field, key.partition_key, key.row_key
                    ))
                })?;
                properties.insert(field.to_string(), written.into());
                for (name, value) in auxiliary {
                    properties.insert(name.clone(), value.clone());
                }
                Ok(Some(properties))
            },
        )
        .await?;

        counter!("counter_increments_total", "table" => key.table).increment(1);
        Ok(written)
    }

    pub async fn increment_aggregate(
        &self,
        day: NaiveDate,
        category: UsageCategory,
        token: &str,
        delta: i64,
    ) -> Result<i64, EngineError> {
        let key = AggregateCounter::key(day, category, token);
        self.merge_increment(&key, TOTAL_INTERACTION_COUNT, delta, &Properties::new())
            .await
    }

    /// Adds to an agent counter. A present `agent_name` replaces the stored one.
    pub async fn increment_agent(
        &self,
        day: NaiveDate,
        token: &str,
        agent_id: &str,
        agent_name: Option<&str>,
        delta: i64,
    ) -> Result<i64, EngineError> {
        let key = AgentCounter::key(day, token, agent_id);
        self.merge_increment(
            &key,
            TOTAL_INTERACTION_COUNT,
            delta,
            &AgentCounter::auxiliary(agent_name),
        )
        .await
    }

    pub async fn record_unhandled_host(&self, host: &str) -> Result<i64, EngineError> {
        let key = UnhandledHostCounter::key(host);
        self.merge_increment(&key, OCCURRENCE_COUNT, 1, &Properties::new())
            .await
    }

    pub async fn get_aggregate(
        &self,
        day: NaiveDate,
        category: UsageCategory,
        token: &str,
    ) -> Result<Option<AggregateCounter>, EngineError> {
        let key = AggregateCounter::key(day, category, token);
        match self.read(&key).await? {
            Some(entity) => Ok(Some(AggregateCounter::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    pub async fn get_agent(
        &self,
        day: NaiveDate,
        token: &str,
        agent_id: &str,
    ) -> Result<Option<AgentCounter>, EngineError> {
        let key = AgentCounter::key(day, token, agent_id);
        match self.read(&key).await? {
            Some(entity) => Ok(Some(AgentCounter::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    pub async fn get_unhandled_host(
        &self,
        host: &str,
    ) -> Result<Option<UnhandledHostCounter>, EngineError> {
        let key = UnhandledHostCounter::key(host);
        match self.read(&key).await? {
            Some(entity) => Ok(Some(UnhandledHostCounter::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    async fn read(&self, key: &CounterKey) -> Result<Option<TableEntity>, EngineError> {
        Ok(self
            .policy
            .bounded(
                self.store
                    .get(key.table, &key.partition_key, &key.row_key),
            )
            .await?)
    }
}
