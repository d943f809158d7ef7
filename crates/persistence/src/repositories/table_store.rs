//! PostgreSQL-backed table store.
//!
//! All logical tables share `table_entities`. Conditional writes compare the
//! row's `etag` column inside the statement's WHERE clause, so a stale token
//! affects zero rows instead of overwriting a concurrent change.

use domain::models::{ETag, TableEntity};
use domain::services::TableStore;
use domain::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::TableEntityRow;
use crate::metrics::QueryTimer;

/// Repository implementing [`TableStore`] over the table_entities table.
#[derive(Clone)]
pub struct PgTableStore {
    pool: PgPool,
}

impl PgTableStore {
    /// Creates a new PgTableStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM table_entities
                WHERE table_name = $1 AND partition_key = $2 AND row_key = $3
            )
            "#,
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    /// Zero rows affected by a conditional write: tell a stale token from a
    /// missing entity.
    async fn missed_write(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StoreError {
        match self.exists(table, partition_key, row_key).await {
            Ok(true) => StoreError::PreconditionFailed,
            Ok(false) => StoreError::NotFound,
            Err(e) => e,
        }
    }
}

/// Maps sqlx failures onto store errors.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
        sqlx::Error::RowNotFound => StoreError::NotFound,
        e @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. }) => StoreError::Serialization(e.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

/// Tokens issued by this store are UUIDs; anything else can never match.
fn parse_etag(etag: &ETag) -> Result<Uuid, StoreError> {
    Uuid::parse_str(etag.as_str()).map_err(|_| StoreError::PreconditionFailed)
}

#[async_trait::async_trait]
impl TableStore for PgTableStore {
    async fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, StoreError> {
        let timer = QueryTimer::new("get", table);
        let result = sqlx::query_as::<_, TableEntityRow>(
            r#"
            SELECT table_name, partition_key, row_key, properties, etag, updated_at
            FROM table_entities
            WHERE table_name = $1 AND partition_key = $2 AND row_key = $3
            "#,
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result
            .map_err(map_sqlx_error)?
            .map(TableEntityRow::into_domain)
            .transpose()
    }

    async fn insert(&self, table: &str, entity: TableEntity) -> Result<ETag, StoreError> {
        let timer = QueryTimer::new("insert", table);
        let etag = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO table_entities (table_name, partition_key, row_key, properties, etag)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(serde_json::Value::Object(entity.properties))
        .bind(etag)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(map_sqlx_error)?;
        Ok(ETag::new(etag.to_string()))
    }

    async fn update(
        &self,
        table: &str,
        entity: TableEntity,
        etag: &ETag,
    ) -> Result<ETag, StoreError> {
        let expected = parse_etag(etag)?;
        let timer = QueryTimer::new("update", table);
        let new_etag = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            UPDATE table_entities
            SET properties = $4, etag = $5, updated_at = NOW()
            WHERE table_name = $1 AND partition_key = $2 AND row_key = $3 AND etag = $6
            "#,
        )
        .bind(table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(serde_json::Value::Object(entity.properties))
        .bind(new_etag)
        .bind(expected)
        .execute(&self.pool)
        .await;
        timer.record();

        if result.map_err(map_sqlx_error)?.rows_affected() == 0 {
            return Err(self
                .missed_write(table, &entity.partition_key, &entity.row_key)
                .await);
        }
        Ok(ETag::new(new_etag.to_string()))
    }

    async fn upsert(&self, table: &str, entity: TableEntity) -> Result<ETag, StoreError> {
        let timer = QueryTimer::new("upsert", table);
        let etag = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO table_entities (table_name, partition_key, row_key, properties, etag)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (table_name, partition_key, row_key) DO UPDATE SET
                properties = EXCLUDED.properties,
                etag = EXCLUDED.etag,
                updated_at = NOW()
            "#,
        )
        .bind(table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(serde_json::Value::Object(entity.properties))
        .bind(etag)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(map_sqlx_error)?;
        Ok(ETag::new(etag.to_string()))
    }

    async fn delete(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
        etag: Option<&ETag>,
    ) -> Result<(), StoreError> {
        let timer = QueryTimer::new("delete", table);
        let result = match etag {
            Some(etag) => {
                let expected = parse_etag(etag)?;
                sqlx::query(
                    r#"
                    DELETE FROM table_entities
                    WHERE table_name = $1 AND partition_key = $2 AND row_key = $3 AND etag = $4
                    "#,
                )
                .bind(table)
                .bind(partition_key)
                .bind(row_key)
                .bind(expected)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    DELETE FROM table_entities
                    WHERE table_name = $1 AND partition_key = $2 AND row_key = $3
                    "#,
                )
                .bind(table)
                .bind(partition_key)
                .bind(row_key)
                .execute(&self.pool)
                .await
            }
        };
        timer.record();

        if result.map_err(map_sqlx_error)?.rows_affected() == 0 {
            return Err(match etag {
                Some(_) => self.missed_write(table, partition_key, row_key).await,
                None => StoreError::NotFound,
            });
        }
        Ok(())
    }

    async fn query_partition_range(
        &self,
        table: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TableEntity>, StoreError> {
        let timer = QueryTimer::new("query_partition_range", table);
        let result = sqlx::query_as::<_, TableEntityRow>(
            r#"
            SELECT table_name, partition_key, row_key, properties, etag, updated_at
            FROM table_entities
            WHERE table_name = $1 AND partition_key >= $2 AND partition_key < $3
            ORDER BY partition_key, row_key
            "#,
        )
        .bind(table)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(TableEntityRow::into_domain)
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
