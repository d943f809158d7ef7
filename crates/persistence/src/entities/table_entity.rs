//! Table entity row (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ETag, Properties, TableEntity};
use domain::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the table_entities table.
#[derive(Debug, Clone, FromRow)]
pub struct TableEntityRow {
    pub table_name: String,
    pub partition_key: String,
    pub row_key: String,
    pub properties: serde_json::Value,
    pub etag: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl TableEntityRow {
    /// Converts the row into a domain entity carrying its concurrency token.
    pub fn into_domain(self) -> Result<TableEntity, StoreError> {
        let properties: Properties = match self.properties {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(StoreError::Serialization(format!(
                    "properties of {}/{}/{} are not an object: {}",
                    self.table_name, self.partition_key, self.row_key, other
                )))
            }
        };
        Ok(TableEntity {
            partition_key: self.partition_key,
            row_key: self.row_key,
            properties,
            etag: Some(ETag::new(self.etag.to_string())),
        })
    }
}
