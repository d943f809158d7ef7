//! Shared utilities and common types for the activity usage backend.
//!
//! This crate provides functionality used across all other crates:
//! - Deterministic pseudonymization of user identifiers
//! - Partition key composition for day-partitioned tables

pub mod crypto;
pub mod partition;
