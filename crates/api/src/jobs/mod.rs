//! Background job scheduler and job implementations.

mod key_rotation;
mod scheduler;

pub use key_rotation::KeyRotationJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
