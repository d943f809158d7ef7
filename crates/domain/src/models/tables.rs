//! Table names used by the engine.

/// Per-user, per-day, per-category interaction counters.
pub const DAILY_APP_USAGE: &str = "DailyAppUsage";

/// Per-user, per-day, per-agent interaction counters.
pub const DAILY_AGENT_USAGE: &str = "DailyAgentUsage";

/// Occurrence counts of hosts the classifier could not map.
pub const UNHANDLED_APP_HOSTS: &str = "UnhandledAppHosts";

/// Holds the webhook pause flag.
pub const WEBHOOK_STATE: &str = "WebhookState";

/// One row per webhook delivery.
pub const WEBHOOK_TRIGGERS: &str = "WebhookTriggers";

/// Optional per-interaction detail rows, partitioned like the counters.
pub const INTERACTION_DETAILS: &str = "InteractionDetails";

/// Tables partitioned by `yyyy-MM-dd-<token>`; these are re-keyed on rotation.
pub const PSEUDONYMIZED_DAILY_TABLES: [&str; 3] =
    [DAILY_APP_USAGE, DAILY_AGENT_USAGE, INTERACTION_DETAILS];
