//! Key-value table store seam.
//!
//! The store offers single-entity operations only: reads return a concurrency
//! token, updates and deletes can be made conditional on it, and there are no
//! transactions or native atomic increments.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::{ETag, TableEntity};

/// Table store operations used by the engine.
#[async_trait::async_trait]
pub trait TableStore: Send + Sync {
    /// Read one entity with its concurrency token.
    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StoreError>;

    /// Insert a new entity. Fails with [`StoreError::Conflict`] if one exists.
    async fn insert(&self, table: &str, entity: TableEntity) -> Result<ETag, StoreError>;

    /// Replace the properties of an existing entity if its token still matches.
    ///
    /// Fails with [`StoreError::PreconditionFailed`] on a stale token and
    /// [`StoreError::NotFound`] if the entity is gone.
    async fn update(
        &self,
        table: &str,
        entity: TableEntity,
        etag: &ETag,
    ) -> Result<ETag, StoreError>;

    /// Insert or replace unconditionally.
    async fn upsert(&self, table: &str, entity: TableEntity) -> Result<ETag, StoreError>;

    /// Delete an entity, optionally only if its token still matches.
    async fn delete(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        etag: Option<&ETag>,
    ) -> Result<(), StoreError>;

    /// All entities with `start <= partition_key < end`, ordered by key.
    async fn query_partition_range(
        &self,
        table: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TableEntity>, StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}

type Rows = BTreeMap<(String, String), TableEntity>;

/// Process-local table store.
///
/// Every operation yields to the runtime first, so concurrent callers
/// interleave between a read and the following conditional write the same way
/// they would against a remote store.
#[derive(Default)]
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<String, Rows>>,
    version: AtomicU64,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entity in a table, ordered by key.
    pub fn snapshot(&self, table: &str) -> Vec<TableEntity> {
        self.tables
            .lock()
            .map(|tables| {
                tables
                    .get(table)
                    .map(|rows| rows.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    fn next_etag(&self) -> ETag {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        ETag::new(format!("W/\"{}\"", version))
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Rows) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store poisoned".to_string()))?;
        f(tables.entry(table.to_string()).or_default())
    }

    fn stamp(&self, mut entity: TableEntity) -> (ETag, TableEntity) {
        let etag = self.next_etag();
        entity.etag = Some(etag.clone());
        (etag, entity)
    }
}

#[async_trait::async_trait]
impl TableStore for InMemoryTableStore {
    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StoreError> {
        tokio::task::yield_now().await;
        self.with_table(table, |rows| {
            Ok(rows
                .get(&(partition_key.to_string(), row_key.to_string()))
                .cloned())
        })
    }

    async fn insert(&self, table: &str, entity: TableEntity) -> Result<ETag, StoreError> {
        tokio::task::yield_now().await;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let (etag, entity) = self.stamp(entity);
        self.with_table(table, |rows| {
            if rows.contains_key(&key) {
                return Err(StoreError::Conflict);
            }
            rows.insert(key, entity);
            Ok(etag)
        })
    }

    async fn update(
        &self,
        table: &str,
        entity: TableEntity,
        etag: &ETag,
    ) -> Result<ETag, StoreError> {
        tokio::task::yield_now().await;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let (new_etag, entity) = self.stamp(entity);
        self.with_table(table, |rows| {
            let current = rows.get_mut(&key).ok_or(StoreError::NotFound)?;
            if current.etag.as_ref() != Some(etag) {
                return Err(StoreError::PreconditionFailed);
            }
            *current = entity;
            Ok(new_etag)
        })
    }

    async fn upsert(&self, table: &str, entity: TableEntity) -> Result<ETag, StoreError> {
        tokio::task::yield_now().await;
        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let (etag, entity) = self.stamp(entity);
        self.with_table(table, |rows| {
            rows.insert(key, entity);
            Ok(etag)
        })
    }

    async fn delete(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        etag: Option<&ETag>,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let key = (partition_key.to_string(), row_key.to_string());
        self.with_table(table, |rows| {
            let current = rows.get(&key).ok_or(StoreError::NotFound)?;
            if let Some(expected) = etag {
                if current.etag.as_ref() != Some(expected) {
                    return Err(StoreError::PreconditionFailed);
                }
            }
            rows.remove(&key);
            Ok(())
        })
    }

    async fn query_partition_range(
        &self,
        table: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TableEntity>, StoreError> {
        tokio::task::yield_now().await;
        if start >= end {
            return Ok(Vec::new());
        }
        self.with_table(table, |rows| {
            Ok(rows
                .range((start.to_string(), String::new())..(end.to_string(), String::new()))
                .map(|(_, entity)| entity.clone())
                .collect())
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
