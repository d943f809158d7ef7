//! HTTP surface of the activity usage service: webhook receiver, admin
//! controls, health probes and the key rotation job.

pub mod app;
pub mod config;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
