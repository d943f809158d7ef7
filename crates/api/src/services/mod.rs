//! Services wiring domain logic to the process environment.

pub mod rotation;
pub mod secrets;

pub use rotation::{RotationError, RotationRunner};
pub use secrets::{EnvSecretStore, SECRET_ENV_PREFIX};
