//! Environment-backed secret store.

use domain::services::SecretStore;
use domain::EngineError;

/// Prefix of the environment variables secrets are read from.
pub const SECRET_ENV_PREFIX: &str = "AU_SECRET_";

/// Reads secret `name` from `AU_SECRET_<NAME>`, upper-cased with `-` and `.`
/// replaced by `_` (`pseudonym-key` is read from `AU_SECRET_PSEUDONYM_KEY`).
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }

    pub fn variable_name(name: &str) -> String {
        let suffix: String = name
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{}", SECRET_ENV_PREFIX, suffix)
    }
}

#[async_trait::async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let variable = Self::variable_name(name);
        std::env::var(&variable)
            .map(String::into_bytes)
            .map_err(|_| EngineError::Secret(format!("{} is not set", variable)))
    }
}
