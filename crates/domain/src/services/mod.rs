//! Domain services for activity usage aggregation.
//!
//! Services hold the business logic and reach storage only through the
//! [`TableStore`] and [`SecretStore`] seams.

pub mod aggregation;
pub mod classifier;
pub mod counter_store;
pub mod key_rotation;
pub mod optimistic;
pub mod pause_flag;
pub mod secret_store;
pub mod table_store;
pub mod trigger_log;

pub use aggregation::{AggregationEngine, ProcessSummary, RecordOutcome};
pub use classifier::{classify, uses_web_plugin};
pub use counter_store::CounterStore;
pub use key_rotation::{KeyRotation, RotationReport, DEFAULT_WINDOW_DAYS};
pub use optimistic::{read_modify_write, RetryPolicy, WriteOutcome};
pub use pause_flag::PauseFlag;
pub use secret_store::{load_pseudonymizer, SecretStore, StaticSecretStore};
pub use table_store::{InMemoryTableStore, TableStore};
pub use trigger_log::TriggerLog;
