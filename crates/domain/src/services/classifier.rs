//! Maps an activity record to the usage category it is counted under.

use crate::models::{ActivityRecord, Classification, UsageCategory};

/// Plugin id that marks a web-grounded interaction.
pub const WEB_SEARCH_PLUGIN_ID: &str = "BingWebSearch";

/// Context type prefix that marks an interaction inside a Teams surface.
const TEAMS_CONTEXT_PREFIX: &str = "Teams";

/// Primary category of a record. Pure and deterministic.
pub fn classify(record: &ActivityRecord) -> Classification {
    let category = match record.app_host.as_str() {
        "Word" => UsageCategory::Word,
        "Excel" => UsageCategory::Excel,
        "PowerPoint" => UsageCategory::PowerPoint,
        "OneNote" => UsageCategory::OneNote,
        "Outlook" => UsageCategory::Outlook,
        "Loop" => UsageCategory::Loop,
        "Whiteboard" => UsageCategory::Whiteboard,
        "Designer" => UsageCategory::Designer,
        "SharePoint" => UsageCategory::SharePoint,
        "M365AdminCenter" => UsageCategory::AdminCenter,
        "OAIAutomationAgent" => UsageCategory::CopilotAction,
        "Copilot Studio" => UsageCategory::CopilotStudio,
        "Forms" => UsageCategory::Forms,
        "Teams" => {
            if record
                .context_types()
                .any(|t| t.starts_with(TEAMS_CONTEXT_PREFIX))
            {
                UsageCategory::Teams
            } else {
                UsageCategory::CopilotChat
            }
        }
        "Office" => {
            if record.agent().is_some() {
                UsageCategory::Agent
            } else {
                UsageCategory::CopilotChat
            }
        }
        "Edge" => UsageCategory::CopilotChat,
        other => return Classification::Unhandled(other.to_string()),
    };
    Classification::Known(category)
}

/// Whether the record also counts toward [`UsageCategory::WebPlugin`].
pub fn uses_web_plugin(record: &ActivityRecord) -> bool {
    record.plugins().any(|id| id == WEB_SEARCH_PLUGIN_ID)
}
