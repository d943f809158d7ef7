//! Daily re-keying of recent pseudonymized partitions.

use std::sync::Arc;

use super::scheduler::{Job, JobFrequency};
use crate::services::RotationRunner;

/// Rotates from the configured previous secret to the current key once a day.
pub struct KeyRotationJob {
    runner: Arc<RotationRunner>,
    previous_secret_name: String,
}

impl KeyRotationJob {
    pub fn new(runner: Arc<RotationRunner>, previous_secret_name: impl Into<String>) -> Self {
        Self {
            runner,
            previous_secret_name: previous_secret_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl Job for KeyRotationJob {
    fn name(&self) -> &'static str {
        "key_rotation"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Daily
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .runner
            .run_today(&self.previous_secret_name)
            .await
            .map_err(|e| e.to_string())?;

        if report.failed > 0 || report.failed_days > 0 {
            return Err(format!(
                "{} entities and {} day queries failed, {} moved",
                report.failed, report.failed_days, report.moved
            ));
        }
        Ok(())
    }
}
