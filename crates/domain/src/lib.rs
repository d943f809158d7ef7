//! Domain layer for the activity usage backend.
//!
//! This crate contains:
//! - Domain models (ActivityRecord, UsageCategory, typed counters, TableEntity)
//! - The aggregation engine, key rotation and pause flag services
//! - Store seams (`TableStore`, `SecretStore`) with in-memory implementations
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::{EngineError, StoreError};
