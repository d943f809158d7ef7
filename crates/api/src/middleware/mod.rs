//! HTTP middleware components.

pub mod auth;
pub mod logging;
pub mod metrics;
pub mod trace_id;

pub use auth::{require_admin_token, tokens_match, ADMIN_TOKEN_HEADER};
pub use logging::init_logging;
pub use metrics::{init_metrics, metrics_handler, metrics_middleware, record_webhook_delivery};
pub use trace_id::{trace_id, RequestId, REQUEST_ID_HEADER};
