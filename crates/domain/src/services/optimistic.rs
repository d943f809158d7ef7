//! Optimistic read-modify-write over a [`TableStore`].
//!
//! Every mutation of a shared entity goes through [`read_modify_write`]: read
//! the entity and its token, compute the new properties, then insert (when
//! absent) or update conditionally (when present). A lost race restarts from
//! the read, up to the policy's attempt limit.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use super::table_store::TableStore;
use crate::error::{EngineError, StoreError};
use crate::models::{ETag, Properties, TableEntity};

/// Default attempts before reporting contention.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default bound on a single store call.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds on optimistic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub operation_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, operation_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            operation_timeout,
        }
    }

    /// Runs one store call under the operation timeout.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.operation_timeout)),
        }
    }
}

/// Result of a successful [`read_modify_write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted(ETag),
    Updated(ETag),
    /// The merge function declined to write.
    Unchanged,
}

/// Applies `merge` to the current properties of an entity and writes the result.
///
/// `merge` receives `None` when the entity does not exist. Returning `None`
/// leaves the store untouched and an error aborts without writing. It may run
/// once per attempt, so it must not have side effects beyond its captured
/// output.
///
/// Lost races (insert conflict, stale token, entity deleted between read and
/// write) restart from the read. After `policy.max_attempts` lost races the
/// call fails with [`EngineError::RetryableContention`]; any other store
/// failure fails immediately with [`EngineError::StoreUnavailable`].
pub async fn read_modify_write<F>(
    store: &dyn TableStore,
    policy: &RetryPolicy,
    table: &str,
    partition_key: &str,
    row_key: &str,
    mut merge: F,
) -> Result<WriteOutcome, EngineError>
where
    F: FnMut(Option<&Properties>) -> Result<Option<Properties>, EngineError> + Send,
{
    for attempt in 1..=policy.max_attempts {
        let current = policy
            .bounded(store.get(table, partition_key, row_key))
            .await?;

        let written = match current {
            None => {
                let Some(properties) = merge(None)? else {
                    return Ok(WriteOutcome::Unchanged);
                };
                let entity = TableEntity::new(partition_key, row_key).with_properties(properties);
                policy
                    .bounded(store.insert(table, entity))
                    .await
                    .map(WriteOutcome::Inserted)
            }
            Some(existing) => {
                let Some(properties) = merge(Some(&existing.properties))? else {
                    return Ok(WriteOutcome::Unchanged);
                };
                let etag = existing.etag.ok_or_else(|| {
                    StoreError::Serialization(format!(
                        "{}/{}/{} read without a concurrency token",
                        table, partition_key, row_key
                    ))
                })?;
                let entity = TableEntity::new(partition_key, row_key).with_properties(properties);
                policy
                    .bounded(store.update(table, entity, &etag))
                    .await
                    .map(WriteOutcome::Updated)
            }
        };

        match written {
            Ok(outcome) => return Ok(outcome),
            Err(StoreError::Conflict | StoreError::PreconditionFailed | StoreError::NotFound) => {
                counter!("store_write_conflicts_total", "table" => table.to_string()).increment(1);
                debug!(
                    table = %table,
                    partition_key = %partition_key,
                    row_key = %row_key,
                    attempt,
                    "Conditional write lost a race, retrying"
                );
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    counter!("store_write_contention_total", "table" => table.to_string()).increment(1);
    warn!(
        table = %table,
        partition_key = %partition_key,
        row_key = %row_key,
        attempts = policy.max_attempts,
        "Giving up on contended write"
    );
    Err(EngineError::RetryableContention {
        table: table.to_string(),
        partition_key: partition_key.to_string(),
        row_key: row_key.to_string(),
        attempts: policy.max_attempts,
    })
}
