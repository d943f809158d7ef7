//! Persistence layer for the activity usage backend.
//!
//! This crate contains:
//! - Database connection management
//! - The `table_entities` row mapping
//! - `PgTableStore`, the PostgreSQL implementation of `domain::services::TableStore`

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;

pub use repositories::PgTableStore;
