//! Activity records delivered by the notification source.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Context the interaction happened in (e.g. a `TeamsMeeting`, a document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTag {
    #[serde(rename = "type", default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

impl ContextTag {
    pub fn of_type(context_type: impl Into<String>) -> Self {
        Self {
            context_type: Some(context_type.into()),
            id: None,
        }
    }
}

/// One interaction reported by the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Upstream record id, used only for detail rows.
    #[serde(default)]
    pub id: Option<String>,

    /// Application or surface the interaction originated from.
    #[validate(length(min = 1, message = "appHost must not be empty"))]
    pub app_host: String,

    #[serde(default)]
    pub contexts: Option<Vec<ContextTag>>,

    #[serde(default)]
    pub plugin_ids: Option<Vec<String>>,

    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub agent_name: Option<String>,

    /// UTC calendar day of the interaction.
    pub event_date: NaiveDate,

    /// Plaintext user identifier (login name). Never stored or logged as is.
    #[validate(length(min = 1, message = "userId must not be empty"))]
    pub user_id: String,

    #[serde(default)]
    pub creation_time: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    pub fn new(
        app_host: impl Into<String>,
        user_id: impl Into<String>,
        event_date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            app_host: app_host.into(),
            contexts: None,
            plugin_ids: None,
            agent_id: None,
            agent_name: None,
            event_date,
            user_id: user_id.into(),
            creation_time: None,
        }
    }

    pub fn with_context(mut self, context: ContextTag) -> Self {
        self.contexts.get_or_insert_with(Vec::new).push(context);
        self
    }

    pub fn with_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_ids
            .get_or_insert_with(Vec::new)
            .push(plugin_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>, agent_name: Option<&str>) -> Self {
        self.agent_id = Some(agent_id.into());
        self.agent_name = agent_name.map(str::to_string);
        self
    }

    /// Agent id, treating an empty string as absent.
    pub fn agent(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn context_types(&self) -> impl Iterator<Item = &str> {
        self.contexts
            .iter()
            .flatten()
            .filter_map(|c| c.context_type.as_deref())
    }

    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.plugin_ids.iter().flatten().map(String::as_str)
    }
}
