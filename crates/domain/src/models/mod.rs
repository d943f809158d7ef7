//! Domain models.

pub mod activity;
pub mod counter;
pub mod table_entity;
pub mod tables;
pub mod usage_category;
pub mod webhook_event;

pub use activity::{ActivityRecord, ContextTag};
pub use counter::{
    AgentCounter, AggregateCounter, CounterKey, UnhandledHostCounter, AGENT_NAME,
    OCCURRENCE_COUNT, TOTAL_INTERACTION_COUNT,
};
pub use table_entity::{ETag, Properties, TableEntity};
pub use usage_category::{Classification, UsageCategory};
pub use webhook_event::{InteractionDetail, WebhookTriggerEvent};
