use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use domain::services::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub webhook: WebhookConfig,
    pub admin: AdminConfig,
    pub pseudonymization: PseudonymizationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Inbound activity webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret expected in the `Webhook-AuthID` header.
    pub auth_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Expected in the `X-Admin-Token` header.
    pub api_token: String,
}

/// Names of the secrets pseudonymization keys are derived from.
#[derive(Debug, Clone, Deserialize)]
pub struct PseudonymizationConfig {
    pub secret_name: String,

    /// Secret the previous key was derived from; enables scheduled rotation.
    #[serde(default)]
    pub previous_secret_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_max_merge_attempts")]
    pub max_merge_attempts: u32,

    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_merge_attempts: default_max_merge_attempts(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_merge_attempts,
            Duration::from_millis(self.operation_timeout_ms),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RotationConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default)]
    pub job_enabled: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            job_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregationConfig {
    /// Write an InteractionDetails row per processed record.
    #[serde(default)]
    pub record_details: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    4_194_304
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_max_merge_attempts() -> u32 {
    domain::services::optimistic::DEFAULT_MAX_ATTEMPTS
}
fn default_operation_timeout_ms() -> u64 {
    5_000
}
fn default_window_days() -> u32 {
    domain::services::DEFAULT_WINDOW_DAYS
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with AU__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("AU").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds from embedded defaults so tests do not depend on config files.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30
            max_body_size = 4194304

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [webhook]
            auth_token = "test-webhook-token"

            [admin]
            api_token = "test-admin-token"

            [pseudonymization]
            secret_name = "pseudonym-key"

            [store]
            max_merge_attempts = 5
            operation_timeout_ms = 5000

            [rotation]
            window_days = 8
            job_enabled = false

            [aggregation]
            record_details = false
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        // Skip validation in tests to allow partial configs
        Ok(cfg)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "AU__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.webhook.auth_token.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "AU__WEBHOOK__AUTH_TOKEN environment variable must be set".to_string(),
            ));
        }

        if self.admin.api_token.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "AU__ADMIN__API_TOKEN environment variable must be set".to_string(),
            ));
        }

        if self.pseudonymization.secret_name.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "pseudonymization.secret_name must be set".to_string(),
            ));
        }

        if self.pseudonymization.previous_secret_name.as_deref()
            == Some(self.pseudonymization.secret_name.as_str())
        {
            return Err(ConfigValidationError::InvalidValue(
                "previous_secret_name must differ from secret_name".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.store.max_merge_attempts == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "store.max_merge_attempts must be at least 1".to_string(),
            ));
        }

        if self.rotation.window_days == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "rotation.window_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
