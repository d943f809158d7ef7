//! Aggregation engine: classify, pseudonymize and count activity records.
//!
//! Counters are keyed by the pseudonym token, never by the plaintext user id.
//! Neither the batch nor the single-record path deduplicates input, and
//! increments already applied when a later merge fails stay applied.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use metrics::counter;
use serde::Serialize;
use shared::crypto::Pseudonymizer;
use tracing::{debug, info, warn};
use validator::Validate;

use super::classifier::{classify, uses_web_plugin};
use super::counter_store::CounterStore;
use crate::error::EngineError;
use crate::models::{tables, ActivityRecord, Classification, InteractionDetail, UsageCategory};

/// What a batch contributed, for the caller's response and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub records: u64,
    pub classified: BTreeMap<UsageCategory, u64>,
    pub unclassified: Vec<String>,
    pub agents: BTreeMap<String, u64>,
    pub web_plugin: u64,
}

impl ProcessSummary {
    /// Folds another summary into this one.
    pub fn absorb(&mut self, other: ProcessSummary) {
        self.records += other.records;
        for (category, count) in other.classified {
            *self.classified.entry(category).or_default() += count;
        }
        self.unclassified.extend(other.unclassified);
        for (agent, count) in other.agents {
            *self.agents.entry(agent).or_default() += count;
        }
        self.web_plugin += other.web_plugin;
    }
}

/// What a single record contributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub classification: Classification,
    pub web_plugin: bool,
    pub agent_id: Option<String>,
}

/// Pending increment for one agent counter within a batch.
#[derive(Default)]
struct AgentGroup {
    count: i64,
    name: Option<String>,
}

pub struct AggregationEngine {
    counters: CounterStore,
    pseudonymizer: Pseudonymizer,
    record_details: bool,
}

impl AggregationEngine {
    pub fn new(counters: CounterStore, pseudonymizer: Pseudonymizer) -> Self {
        Self {
            counters,
            pseudonymizer,
            record_details: false,
        }
    }

    /// Also write an `InteractionDetails` row per record.
    pub fn with_details(mut self, record_details: bool) -> Self {
        self.record_details = record_details;
        self
    }

    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    /// Token the engine keys a user's counters by.
    pub fn pseudonymize(&self, user_id: &str) -> String {
        self.pseudonymizer.encode(user_id)
    }

    /// Aggregates a batch of records belonging to one user.
    ///
    /// Every record is validated before anything is written. Records are then
    /// grouped by (day, category) and (day, agent) so each counter is merged
    /// once per batch.
    pub async fn process_batch(
        &self,
        user_id: &str,
        records: &[ActivityRecord],
    ) -> Result<ProcessSummary, EngineError> {
        if user_id.is_empty() {
            return Err(EngineError::InvalidRecord("user id must not be empty".to_string()));
        }
        for record in records {
            validate(record)?;
        }

        let token = self.pseudonymizer.encode(user_id);
        let mut summary = ProcessSummary::default();
        let mut category_groups: BTreeMap<(NaiveDate, UsageCategory), i64> = BTreeMap::new();
        let mut agent_groups: BTreeMap<(NaiveDate, String), AgentGroup> = BTreeMap::new();

        for record in records {
            summary.records += 1;
            match classify(record) {
                Classification::Known(category) => {
                    *category_groups.entry((record.event_date, category)).or_default() += 1;
                    *summary.classified.entry(category).or_default() += 1;
                }
                Classification::Unhandled(host) => {
                    self.record_unhandled(&host).await;
                    summary.unclassified.push(host);
                }
            }
            if uses_web_plugin(record) {
                *category_groups
                    .entry((record.event_date, UsageCategory::WebPlugin))
                    .or_default() += 1;
                summary.web_plugin += 1;
            }
            if let Some(agent_id) = record.agent() {
                let group = agent_groups
                    .entry((record.event_date, agent_id.to_string()))
                    .or_default();
                group.count += 1;
                if record.agent_name.is_some() {
                    group.name = record.agent_name.clone();
                }
                *summary.agents.entry(agent_id.to_string()).or_default() += 1;
            }
            if self.record_details {
                self.record_detail(record, &token).await;
            }
        }

        for ((day, category), count) in category_groups {
            self.counters
                .increment_aggregate(day, category, &token, count)
                .await?;
        }
        for ((day, agent_id), group) in agent_groups {
            self.counters
                .increment_agent(day, &token, &agent_id, group.name.as_deref(), group.count)
                .await?;
        }

        counter!("activity_records_processed_total").increment(summary.records);
        info!(
            token = %token,
            records = summary.records,
            unclassified = summary.unclassified.len(),
            "Processed activity batch"
        );
        Ok(summary)
    }

    /// Aggregates one record. Ends in the same counter state as a batch holding
    /// the same records.
    pub async fn process_record(&self, record: &ActivityRecord) -> Result<RecordOutcome, EngineError> {
        validate(record)?;
        let token = self.pseudonymizer.encode(&record.user_id);
        let classification = classify(record);

        match &classification {
            Classification::Known(category) => {
                self.counters
                    .increment_aggregate(record.event_date, *category, &token, 1)
                    .await?;
            }
            Classification::Unhandled(host) => self.record_unhandled(host).await,
        }

        let web_plugin = uses_web_plugin(record);
        if web_plugin {
            self.counters
                .increment_aggregate(record.event_date, UsageCategory::WebPlugin, &token, 1)
                .await?;
        }

        let agent_id = record.agent().map(str::to_string);
        if let Some(agent_id) = &agent_id {
            self.counters
                .increment_agent(
                    record.event_date,
                    &token,
                    agent_id,
                    record.agent_name.as_deref(),
                    1,
                )
                .await?;
        }

        if self.record_details {
            self.record_detail(record, &token).await;
        }

        counter!("activity_records_processed_total").increment(1);
        debug!(token = %token, ?classification, "Processed activity record");
        Ok(RecordOutcome {
            classification,
            web_plugin,
            agent_id,
        })
    }

    /// Adds a pre-aggregated count to a category counter.
    pub async fn add_category_count(
        &self,
        user_id: &str,
        day: NaiveDate,
        category: UsageCategory,
        count: i64,
    ) -> Result<i64, EngineError> {
        check_count(count)?;
        let token = self.pseudonymizer.encode(user_id);
        self.counters
            .increment_aggregate(day, category, &token, count)
            .await
    }

    /// Adds a pre-aggregated count to an agent counter.
    pub async fn add_agent_count(
        &self,
        user_id: &str,
        day: NaiveDate,
        agent_id: &str,
        agent_name: Option<&str>,
        count: i64,
    ) -> Result<i64, EngineError> {
        check_count(count)?;
        if agent_id.is_empty() {
            return Err(EngineError::InvalidRecord("agent id must not be empty".to_string()));
        }
        let token = self.pseudonymizer.encode(user_id);
        self.counters
            .increment_agent(day, &token, agent_id, agent_name, count)
            .await
    }

    async fn record_unhandled(&self, host: &str) {
        if let Err(e) = self.counters.record_unhandled_host(host).await {
            warn!(host = %host, error = %e, "Failed to record unhandled app host");
        }
    }

    async fn record_detail(&self, record: &ActivityRecord, token: &str) {
        let entity = InteractionDetail::from_record(record, token).to_entity();
        let store = self.counters.store();
        let written = self
            .counters
            .policy()
            .bounded(store.upsert(tables::INTERACTION_DETAILS, entity))
            .await;
        if let Err(e) = written {
            warn!(token = %token, error = %e, "Failed to write interaction detail");
        }
    }
}

fn validate(record: &ActivityRecord) -> Result<(), EngineError> {
    record
        .validate()
        .map_err(|e| EngineError::InvalidRecord(e.to_string()))
}

fn check_count(count: i64) -> Result<(), EngineError> {
    if count < 0 {
        return Err(EngineError::InvalidRecord(format!(
            "count must not be negative, got {}",
            count
        )));
    }
    Ok(())
}
