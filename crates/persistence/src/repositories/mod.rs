//! Repository implementations for database operations.

pub mod table_store;

pub use table_store::PgTableStore;
