//! Single-instance key rotation shared by the admin route and the daily job.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use domain::services::{load_pseudonymizer, KeyRotation, RotationReport, SecretStore};
use domain::EngineError;
use shared::crypto::Pseudonymizer;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("a key rotation is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("key rotation task failed: {0}")]
    Task(String),
}

impl From<RotationError> for ApiError {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::AlreadyRunning => ApiError::Conflict(err.to_string()),
            RotationError::Engine(e) => e.into(),
            RotationError::Task(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Rotates from a named previous secret to the current key. At most one
/// rotation runs at a time; overlapping triggers are refused, not queued.
pub struct RotationRunner {
    rotation: KeyRotation,
    secrets: Arc<dyn SecretStore>,
    current: Pseudonymizer,
    guard: Mutex<()>,
}

impl RotationRunner {
    pub fn new(rotation: KeyRotation, secrets: Arc<dyn SecretStore>, current: Pseudonymizer) -> Self {
        Self {
            rotation,
            secrets,
            current,
            guard: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Rotates on a task of its own, so dropping the caller (a client
    /// disconnect, a request timeout) never stops a rotation between an
    /// entity's copy and its delete.
    pub async fn run_today(
        self: &Arc<Self>,
        previous_secret_name: &str,
    ) -> Result<RotationReport, RotationError> {
        let runner = Arc::clone(self);
        let previous_secret_name = previous_secret_name.to_string();
        let today = Utc::now().date_naive();
        tokio::spawn(async move { runner.run(&previous_secret_name, today).await })
            .await
            .map_err(|e| RotationError::Task(e.to_string()))?
    }

    pub async fn run(
        &self,
        previous_secret_name: &str,
        today: NaiveDate,
    ) -> Result<RotationReport, RotationError> {
        let _running = self.guard.try_lock().map_err(|_| {
            warn!(previous_secret = %previous_secret_name, "Key rotation refused, one is already running");
            RotationError::AlreadyRunning
        })?;

        let old = load_pseudonymizer(self.secrets.as_ref(), previous_secret_name).await?;
        info!(previous_secret = %previous_secret_name, %today, "Starting key rotation");
        Ok(self.rotation.rotate(&old, &self.current, today).await?)
    }
}
