//! Typed aggregate counters and their mapping to table entities.

use chrono::NaiveDate;
use shared::partition::{day_partition_key, split_day_partition_key};

use super::table_entity::{Properties, TableEntity};
use super::tables;
use super::usage_category::UsageCategory;
use crate::error::StoreError;

/// Additive interaction count on daily counters.
pub const TOTAL_INTERACTION_COUNT: &str = "TotalInteractionCount";

/// Display name of an agent; overwritten on every merge.
pub const AGENT_NAME: &str = "AgentName";

/// Additive occurrence count on unhandled host counters.
pub const OCCURRENCE_COUNT: &str = "Count";

/// Storage address of a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub table: &'static str,
    pub partition_key: String,
    pub row_key: String,
}

/// Interactions of one user with one category on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCounter {
    pub day: NaiveDate,
    pub category: UsageCategory,
    pub token: String,
    pub count: i64,
}

impl AggregateCounter {
    pub fn key(day: NaiveDate, category: UsageCategory, token: &str) -> CounterKey {
        CounterKey {
            table: tables::DAILY_APP_USAGE,
            partition_key: day_partition_key(day, token),
            row_key: category.as_str().to_string(),
        }
    }

    pub fn from_entity(entity: &TableEntity) -> Result<Self, StoreError> {
        let (day, token) = split_daily(entity)?;
        let category = entity
            .row_key
            .parse::<UsageCategory>()
            .map_err(StoreError::Serialization)?;
        Ok(Self {
            day,
            category,
            token: token.to_string(),
            count: count_of(entity, TOTAL_INTERACTION_COUNT)?,
        })
    }
}

/// Interactions of one user with one agent on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCounter {
    pub day: NaiveDate,
    pub token: String,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub count: i64,
}

impl AgentCounter {
    pub fn key(day: NaiveDate, token: &str, agent_id: &str) -> CounterKey {
        CounterKey {
            table: tables::DAILY_AGENT_USAGE,
            partition_key: day_partition_key(day, token),
            row_key: agent_id.to_string(),
        }
    }

    /// Auxiliary fields written with every merge.
    pub fn auxiliary(agent_name: Option<&str>) -> Properties {
        let mut aux = Properties::new();
        if let Some(name) = agent_name {
            aux.insert(AGENT_NAME.to_string(), name.into());
        }
        aux
    }

    pub fn from_entity(entity: &TableEntity) -> Result<Self, StoreError> {
        let (day, token) = split_daily(entity)?;
        Ok(Self {
            day,
            token: token.to_string(),
            agent_id: entity.row_key.clone(),
            agent_name: entity.get_str(AGENT_NAME).map(str::to_string),
            count: count_of(entity, TOTAL_INTERACTION_COUNT)?,
        })
    }
}

/// Occurrences of a host the classifier has no rule for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledHostCounter {
    pub host: String,
    pub count: i64,
}

impl UnhandledHostCounter {
    pub fn key(host: &str) -> CounterKey {
        CounterKey {
            table: tables::UNHANDLED_APP_HOSTS,
            partition_key: host.to_string(),
            row_key: host.to_string(),
        }
    }

    pub fn from_entity(entity: &TableEntity) -> Result<Self, StoreError> {
        Ok(Self {
            host: entity.partition_key.clone(),
            count: count_of(entity, OCCURRENCE_COUNT)?,
        })
    }
}

fn split_daily(entity: &TableEntity) -> Result<(NaiveDate, &str), StoreError> {
    split_day_partition_key(&entity.partition_key).ok_or_else(|| {
        StoreError::Serialization(format!(
            "partition key {} is not a daily key",
            entity.partition_key
        ))
    })
}

fn count_of(entity: &TableEntity, field: &str) -> Result<i64, StoreError> {
    entity.get_i64(field).ok_or_else(|| {
        StoreError::Serialization(format!(
            "{} missing on {}/{}",
            field, entity.partition_key, entity.row_key
        ))
    })
}
