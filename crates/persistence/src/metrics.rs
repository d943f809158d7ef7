//! Store operation metrics.

use metrics::histogram;
use std::time::Instant;

/// Record the duration of one table store operation.
pub fn record_store_operation(operation: &str, table: &str, duration_secs: f64) {
    histogram!(
        "store_operation_duration_seconds",
        "operation" => operation.to_string(),
        "table" => table.to_string()
    )
    .record(duration_secs);
}

/// Times one store operation.
///
/// ```ignore
/// let timer = QueryTimer::new("get", table);
/// let result = sqlx::query_as::<_, TableEntityRow>(...).fetch_optional(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    operation: &'static str,
    table: String,
    start: Instant,
}

impl QueryTimer {
    pub fn new(operation: &'static str, table: &str) -> Self {
        Self {
            operation,
            table: table.to_string(),
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_store_operation(self.operation, &self.table, duration);
    }
}
