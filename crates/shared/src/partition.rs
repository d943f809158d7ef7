//! Partition key composition for day-partitioned tables.
//!
//! Daily tables use partition keys of the form `yyyy-MM-dd-<token>`, so every
//! partition for a calendar day sorts between `yyyy-MM-dd` and the next day.

use chrono::NaiveDate;

/// Format used for the day component of partition keys.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Length of the `yyyy-MM-dd-` prefix, separator included.
pub const DAY_PREFIX_LEN: usize = 11;

/// Formats a calendar day as it appears in partition keys.
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Builds the partition key for a day and pseudonym token.
pub fn day_partition_key(day: NaiveDate, token: &str) -> String {
    format!("{}-{}", format_day(day), token)
}

/// Splits a daily partition key into its day and token.
///
/// Returns `None` when the key does not start with a valid `yyyy-MM-dd-` prefix
/// or has nothing after it.
pub fn split_day_partition_key(partition_key: &str) -> Option<(NaiveDate, &str)> {
    let prefix = partition_key.get(..DAY_PREFIX_LEN)?;
    let token = partition_key.get(DAY_PREFIX_LEN..)?;
    if !prefix.ends_with('-') || token.is_empty() {
        return None;
    }
    let day = NaiveDate::parse_from_str(&prefix[..DAY_PREFIX_LEN - 1], DAY_FORMAT).ok()?;
    Some((day, token))
}

/// Returns the `[start, end)` partition key range covering one day.
pub fn day_range(day: NaiveDate) -> (String, String) {
    let next = day.succ_opt().unwrap_or(NaiveDate::MAX);
    (format_day(day), format_day(next))
}
