//! Re-keys recent daily counters from an old pseudonymization key to a new one.
//!
//! For each day in the window, every entity whose partition token decodes
//! under the old key is copied to the partition of the new token and the
//! source is deleted. Copy and delete are separate store calls, so the copy
//! records the source ETag it absorbed under [`ROTATED_FROM_ETAG`] and the
//! integer fields it absorbed under [`ROTATED_FROM_COUNTS`]. A re-run after a
//! missed delete either finds the same ETag and skips straight to the delete,
//! or finds a source that grew since and copies only the growth. The markers
//! are cleared once the source is gone. Re-running a completed rotation moves
//! nothing.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use shared::crypto::Pseudonymizer;
use shared::partition::{day_partition_key, day_range, split_day_partition_key};
use tracing::{debug, error, info, warn};

use super::optimistic::{read_modify_write, RetryPolicy};
use super::table_store::TableStore;
use crate::error::{EngineError, StoreError};
use crate::models::{tables, Properties, TableEntity};

/// Days covered by a rotation, counting today.
pub const DEFAULT_WINDOW_DAYS: u32 = 8;

/// Property on a rotated entity naming the source ETag it absorbed last.
pub const ROTATED_FROM_ETAG: &str = "RotatedFromEtag";

/// Property on a rotated entity holding the source integer fields absorbed so far.
pub const ROTATED_FROM_COUNTS: &str = "RotatedFromCounts";

/// Probe used to tell whether two pseudonymizers share a key.
const KEY_PROBE: &str = "key-rotation-probe";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationReport {
    pub days_scanned: u32,
    pub entities_seen: u64,
    pub moved: u64,
    pub already_rotated: u64,
    pub failed: u64,
    pub failed_days: u32,
}

enum EntityOutcome {
    Moved,
    AlreadyRotated,
}

pub struct KeyRotation {
    store: Arc<dyn TableStore>,
    policy: RetryPolicy,
    window_days: u32,
    tables: Vec<&'static str>,
}

impl KeyRotation {
    pub fn new(store: Arc<dyn TableStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            window_days: DEFAULT_WINDOW_DAYS,
            tables: tables::PSEUDONYMIZED_DAILY_TABLES.to_vec(),
        }
    }

    pub fn with_window_days(mut self, window_days: u32) -> Self {
        self.window_days = window_days.max(1);
        self
    }

    /// Days covered when run on `today`, newest first.
    pub fn window(&self, today: NaiveDate) -> Vec<NaiveDate> {
        (0..self.window_days)
            .filter_map(|offset| today.checked_sub_days(Days::new(u64::from(offset))))
            .collect()
    }

    /// Moves every entity in the window from `old` tokens to `new` tokens.
    ///
    /// Per-entity and per-day failures are logged and counted in the report;
    /// they never abort the rest of the window.
    pub async fn rotate(
        &self,
        old: &Pseudonymizer,
        new: &Pseudonymizer,
        today: NaiveDate,
    ) -> Result<RotationReport, EngineError> {
        if old.encode(KEY_PROBE) == new.encode(KEY_PROBE) {
            return Err(EngineError::Secret(
                "previous and current secrets derive the same key".to_string(),
            ));
        }

        let mut report = RotationReport::default();
        for day in self.window(today) {
            report.days_scanned += 1;
            for table in &self.tables {
                self.rotate_day(table, day, old, new, &mut report).await;
            }
        }

        info!(
            days = report.days_scanned,
            seen = report.entities_seen,
            moved = report.moved,
            already_rotated = report.already_rotated,
            failed = report.failed,
            "Key rotation finished"
        );
        Ok(report)
    }

    async fn rotate_day(
        &self,
        table: &str,
        day: NaiveDate,
        old: &Pseudonymizer,
        new: &Pseudonymizer,
        report: &mut RotationReport,
    ) {
        let (start, end) = day_range(day);
        let entities = match self
            .policy
            .bounded(self.store.query_partition_range(table, &start, &end))
            .await
        {
            Ok(entities) => entities,
            Err(e) => {
                error!(table = %table, %day, error = %e, "Failed to list entities for rotation");
                report.failed_days += 1;
                return;
            }
        };

        for entity in entities {
            report.entities_seen += 1;
            let partition_key = entity.partition_key.clone();
            let row_key = entity.row_key.clone();
            match self.rotate_entity(table, day, entity, old, new).await {
                Ok(EntityOutcome::Moved) => {
                    report.moved += 1;
                    counter!("key_rotation_entities_total", "outcome" => "moved").increment(1);
                }
                Ok(EntityOutcome::AlreadyRotated) => {
                    report.already_rotated += 1;
                    counter!("key_rotation_entities_total", "outcome" => "already_rotated")
                        .increment(1);
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("key_rotation_entities_total", "outcome" => "failed").increment(1);
                    warn!(
                        table = %table,
                        partition_key = %partition_key,
                        row_key = %row_key,
                        error = %e,
                        "Skipping entity during key rotation"
                    );
                }
            }
        }
    }

    async fn rotate_entity(
        &self,
        table: &str,
        day: NaiveDate,
        entity: TableEntity,
        old: &Pseudonymizer,
        new: &Pseudonymizer,
    ) -> Result<EntityOutcome, EngineError> {
        let (_, token) = split_day_partition_key(&entity.partition_key).ok_or_else(|| {
            EngineError::InvalidRecord(format!(
                "partition key {} has no day prefix",
                entity.partition_key
            ))
        })?;

        if new.recognizes(token) && !old.recognizes(token) {
            return Ok(EntityOutcome::AlreadyRotated);
        }

        let plaintext = old.decode(token)?;
        let target_partition_key = day_partition_key(day, &new.encode(&plaintext));
        self.move_entity(table, entity, &target_partition_key).await?;
        debug!(table = %table, target = %target_partition_key, "Rotated entity");
        Ok(EntityOutcome::Moved)
    }

    /// Copies `source` into the target partition, then deletes it.
    ///
    /// If the source changes between copy and delete, the conditional delete
    /// fails, the source is re-read and only what changed is copied again.
    async fn move_entity(
        &self,
        table: &str,
        mut source: TableEntity,
        target_partition_key: &str,
    ) -> Result<(), EngineError> {
        let row_key = source.row_key.clone();

        for _ in 0..self.policy.max_attempts {
            let source_etag = source.etag.clone().ok_or_else(|| {
                StoreError::Serialization(format!(
                    "{}/{} listed without a concurrency token",
                    source.partition_key, row_key
                ))
            })?;
            let marker = source_etag.as_str().to_string();
            let copy = without_markers(&source.properties);
            let snapshot = integer_fields(&copy);

            read_modify_write(
                self.store.as_ref(),
                &self.policy,
                table,
                target_partition_key,
                &row_key,
                |existing| {
                    let Some(target) = existing else {
                        return Ok(Some(with_markers(copy.clone(), &marker, &snapshot)));
                    };
                    if absorbed_etag(target) == Some(marker.as_str()) {
                        return Ok(None);
                    }
                    let absorbed = target.get(ROTATED_FROM_COUNTS).and_then(Value::as_object);
                    let contribution = match absorbed {
                        Some(absorbed) => difference(&copy, absorbed)?,
                        None => copy.clone(),
                    };
                    let merged = absorb(target, &contribution)?;
                    Ok(Some(with_markers(merged, &marker, &snapshot)))
                },
            )
            .await?;

            let deleted = self
                .policy
                .bounded(self.store.delete(
                    table,
                    &source.partition_key,
                    &row_key,
                    Some(&source_etag),
                ))
                .await;
            match deleted {
                Ok(()) | Err(StoreError::NotFound) => {
                    self.clear_markers(table, target_partition_key, &row_key, &marker)
                        .await;
                    return Ok(());
                }
                Err(StoreError::PreconditionFailed) => {
                    let fresh = self
                        .policy
                        .bounded(self.store.get(table, &source.partition_key, &row_key))
                        .await?;
                    match fresh {
                        None => {
                            self.clear_markers(table, target_partition_key, &row_key, &marker)
                                .await;
                            return Ok(());
                        }
                        Some(fresh) => source = fresh,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::RetryableContention {
            table: table.to_string(),
            partition_key: source.partition_key,
            row_key,
            attempts: self.policy.max_attempts,
        })
    }

    /// Drops the markers once their source is gone, so a source recreated
    /// later under the old key is absorbed in full.
    async fn clear_markers(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        marker: &str,
    ) {
        let cleared = read_modify_write(
            self.store.as_ref(),
            &self.policy,
            table,
            partition_key,
            row_key,
            |existing| match existing {
                Some(target) if absorbed_etag(target) == Some(marker) => {
                    Ok(Some(without_markers(target)))
                }
                _ => Ok(None),
            },
        )
        .await;
        if let Err(e) = cleared {
            warn!(
                table = %table,
                partition_key = %partition_key,
                row_key = %row_key,
                error = %e,
                "Failed to clear rotation markers"
            );
        }
    }
}

fn absorbed_etag(target: &Properties) -> Option<&str> {
    target.get(ROTATED_FROM_ETAG).and_then(Value::as_str)
}

fn without_markers(properties: &Properties) -> Properties {
    let mut copy = properties.clone();
    copy.remove(ROTATED_FROM_ETAG);
    copy.remove(ROTATED_FROM_COUNTS);
    copy
}

fn with_markers(mut properties: Properties, marker: &str, absorbed: &Properties) -> Properties {
    properties.insert(ROTATED_FROM_ETAG.to_string(), marker.into());
    properties.insert(ROTATED_FROM_COUNTS.to_string(), Value::Object(absorbed.clone()));
    properties
}

fn integer_fields(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(_, value)| value.as_i64().is_some())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn overflow(name: &str) -> EngineError {
    EngineError::InvalidRecord(format!("{} overflows while rotating", name))
}

/// Integer fields of `current` minus those of `previous`; other fields as in `current`.
fn difference(current: &Properties, previous: &Properties) -> Result<Properties, EngineError> {
    current
        .iter()
        .map(|(name, value)| match value.as_i64() {
            Some(now) => {
                let before = previous.get(name).and_then(Value::as_i64).unwrap_or(0);
                let delta = now.checked_sub(before).ok_or_else(|| overflow(name))?;
                Ok((name.clone(), Value::from(delta)))
            }
            None => Ok((name.clone(), value.clone())),
        })
        .collect()
}

/// Adds integer fields of `contribution` to `target`. Non-integer fields in
/// `target` are kept; missing ones are filled from `contribution`.
fn absorb(target: &Properties, contribution: &Properties) -> Result<Properties, EngineError> {
    let mut merged = target.clone();
    for (name, value) in contribution {
        match value.as_i64() {
            Some(delta) => {
                let current = merged.get(name).and_then(Value::as_i64).unwrap_or(0);
                let sum = current.checked_add(delta).ok_or_else(|| overflow(name))?;
                merged.insert(name.clone(), Value::from(sum));
            }
            None => {
                merged.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    Ok(merged)
}
