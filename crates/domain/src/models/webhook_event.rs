//! Audit rows written alongside aggregation.

use chrono::{DateTime, NaiveDate, Utc};
use shared::partition::{day_partition_key, format_day};
use uuid::Uuid;

use super::activity::ActivityRecord;
use super::table_entity::TableEntity;

/// One webhook delivery, recorded whether or not it was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTriggerEvent {
    pub event_id: Uuid,
    pub name: String,
    pub message: String,
    pub details: String,
    pub category: String,
    pub event_time: DateTime<Utc>,
}

impl WebhookTriggerEvent {
    pub fn webhook(details: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            name: "WebhookTrigger".to_string(),
            message: "Webhook triggered".to_string(),
            details: details.into(),
            category: "Webhook".to_string(),
            event_time: Utc::now(),
        }
    }

    pub fn to_entity(&self) -> TableEntity {
        TableEntity::new(
            format_day(self.event_time.date_naive()),
            self.event_id.to_string(),
        )
        .with_property("EventName", self.name.as_str())
        .with_property("EventMessage", self.message.as_str())
        .with_property("EventDetails", self.details.as_str())
        .with_property("EventCategory", self.category.as_str())
        .with_property("EventTime", self.event_time.to_rfc3339())
    }
}

/// Per-interaction detail row. Carries the pseudonym token, never the user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionDetail {
    pub day: NaiveDate,
    pub record_id: String,
    pub token: String,
    pub app_host: String,
    pub contexts: String,
    pub plugins: String,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
}

impl InteractionDetail {
    pub fn from_record(record: &ActivityRecord, token: &str) -> Self {
        Self {
            day: record.event_date,
            record_id: record
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            token: token.to_string(),
            app_host: record.app_host.clone(),
            contexts: record.context_types().collect::<Vec<_>>().join(", "),
            plugins: record.plugins().collect::<Vec<_>>().join(", "),
            agent_id: record.agent().map(str::to_string),
            agent_name: record.agent_name.clone(),
            creation_time: record.creation_time,
        }
    }

    pub fn to_entity(&self) -> TableEntity {
        let mut entity = TableEntity::new(day_partition_key(self.day, &self.token), &self.record_id)
            .with_property("AppHost", self.app_host.as_str())
            .with_property("Contexts", self.contexts.as_str())
            .with_property("AISystemPlugin", self.plugins.as_str());
        if let Some(agent_id) = &self.agent_id {
            entity = entity.with_property("AgentId", agent_id.as_str());
        }
        if let Some(agent_name) = &self.agent_name {
            entity = entity.with_property("AgentName", agent_name.as_str());
        }
        if let Some(creation_time) = &self.creation_time {
            entity = entity.with_property("CreationTime", creation_time.to_rfc3339());
        }
        entity
    }
}
