use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::services::{
    load_pseudonymizer, AggregationEngine, CounterStore, KeyRotation, PauseFlag, SecretStore,
    TableStore, TriggerLog,
};
use domain::EngineError;

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_admin_token, trace_id};
use crate::routes::{admin, health, webhooks};
use crate::services::RotationRunner;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TableStore>,
    pub engine: Arc<AggregationEngine>,
    pub pause: PauseFlag,
    pub triggers: TriggerLog,
    pub rotation: Arc<RotationRunner>,
}

impl AppState {
    /// Derives the current key and wires every service onto `store`.
    pub async fn build(
        config: Config,
        store: Arc<dyn TableStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self, EngineError> {
        let policy = config.store.retry_policy();
        let current =
            load_pseudonymizer(secrets.as_ref(), &config.pseudonymization.secret_name).await?;

        let engine = AggregationEngine::new(CounterStore::new(store.clone(), policy), current.clone())
            .with_details(config.aggregation.record_details);
        let rotation = KeyRotation::new(store.clone(), policy)
            .with_window_days(config.rotation.window_days);

        Ok(Self {
            engine: Arc::new(engine),
            pause: PauseFlag::new(store.clone(), policy),
            triggers: TriggerLog::new(store.clone(), policy),
            rotation: Arc::new(RotationRunner::new(rotation, secrets, current)),
            store,
            config: Arc::new(config),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The webhook authenticates with its own header inside the handler so
    // rejected deliveries are still logged.
    let webhook_routes =
        Router::new().route("/api/v1/webhooks/activity", post(webhooks::receive_activity));

    let admin_auth = middleware::from_fn_with_state(state.clone(), require_admin_token);
    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/webhook/state",
            get(admin::get_webhook_state).put(admin::set_webhook_state),
        )
        .route_layer(admin_auth.clone());

    // Runs for as long as the window takes, so it sits outside the request
    // timeout; the rotation itself is detached from the request future.
    let rotation_routes = Router::new()
        .route("/api/v1/admin/key-rotation", post(admin::rotate_keys))
        .route_layer(admin_auth);

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(admin_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .merge(rotation_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(DefaultBodyLimit::max(config.server.max_body_size))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
