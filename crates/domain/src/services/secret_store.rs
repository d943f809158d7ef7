//! Secret store seam used to derive pseudonymization keys.

use std::collections::HashMap;

use shared::crypto::Pseudonymizer;

use crate::error::EngineError;

/// Source of secret material.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Vec<u8>, EngineError>;
}

/// Fetches a secret and derives the pseudonymizer keyed by it.
pub async fn load_pseudonymizer(
    secrets: &dyn SecretStore,
    name: &str,
) -> Result<Pseudonymizer, EngineError> {
    let secret = secrets.get_secret(name).await?;
    if secret.is_empty() {
        return Err(EngineError::Secret(format!("secret {} is empty", name)));
    }
    tracing::info!(secret_name = %name, "Derived pseudonymization key");
    Ok(Pseudonymizer::derive(&secret))
}

/// Secrets held in memory, for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    secrets: HashMap<String, Vec<u8>>,
}

impl StaticSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait::async_trait]
impl SecretStore for StaticSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.secrets
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::Secret(format!("secret {} not found", name)))
    }
}
