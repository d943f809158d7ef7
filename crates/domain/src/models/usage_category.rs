//! Usage category taxonomy.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category an activity record is counted under.
///
/// `WebPlugin` is derived: it is counted in addition to the primary category
/// and never returned by the classifier as the primary outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UsageCategory {
    Word,
    Excel,
    PowerPoint,
    OneNote,
    Outlook,
    Loop,
    Whiteboard,
    Teams,
    CopilotChat,
    Designer,
    SharePoint,
    AdminCenter,
    CopilotAction,
    CopilotStudio,
    Forms,
    Agent,
    WebPlugin,
}

impl UsageCategory {
    pub const ALL: [UsageCategory; 17] = [
        UsageCategory::Word,
        UsageCategory::Excel,
        UsageCategory::PowerPoint,
        UsageCategory::OneNote,
        UsageCategory::Outlook,
        UsageCategory::Loop,
        UsageCategory::Whiteboard,
        UsageCategory::Teams,
        UsageCategory::CopilotChat,
        UsageCategory::Designer,
        UsageCategory::SharePoint,
        UsageCategory::AdminCenter,
        UsageCategory::CopilotAction,
        UsageCategory::CopilotStudio,
        UsageCategory::Forms,
        UsageCategory::Agent,
        UsageCategory::WebPlugin,
    ];

    /// Name used as the row key of aggregate counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageCategory::Word => "Word",
            UsageCategory::Excel => "Excel",
            UsageCategory::PowerPoint => "PowerPoint",
            UsageCategory::OneNote => "OneNote",
            UsageCategory::Outlook => "Outlook",
            UsageCategory::Loop => "Loop",
            UsageCategory::Whiteboard => "Whiteboard",
            UsageCategory::Teams => "Teams",
            UsageCategory::CopilotChat => "CopilotChat",
            UsageCategory::Designer => "Designer",
            UsageCategory::SharePoint => "SharePoint",
            UsageCategory::AdminCenter => "AdminCenter",
            UsageCategory::CopilotAction => "CopilotAction",
            UsageCategory::CopilotStudio => "CopilotStudio",
            UsageCategory::Forms => "Forms",
            UsageCategory::Agent => "Agent",
            UsageCategory::WebPlugin => "WebPlugin",
        }
    }
}

impl std::fmt::Display for UsageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UsageCategory::ALL
            .iter()
            .find(|category| category.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown usage category: {}", s))
    }
}

/// Outcome of classifying one activity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Known(UsageCategory),
    /// No rule matched; carries the offending host string.
    Unhandled(String),
}

impl Classification {
    pub fn category(&self) -> Option<UsageCategory> {
        match self {
            Classification::Known(category) => Some(*category),
            Classification::Unhandled(_) => None,
        }
    }
}
