//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod table_entity;

pub use table_entity::TableEntityRow;
