//! Common test utilities for integration tests.
//!
//! The app runs against the in-memory table store, so no database is needed.

// Each integration test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use activity_usage_api::app::{create_app, AppState};
use activity_usage_api::config::{
    AdminConfig, AggregationConfig, Config, DatabaseConfig, LoggingConfig,
    PseudonymizationConfig, RotationConfig, ServerConfig, StoreConfig, WebhookConfig,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use domain::services::{InMemoryTableStore, StaticSecretStore, TableStore};
use serde_json::Value;
use tower::ServiceExt;

pub const WEBHOOK_TOKEN: &str = "test-webhook-token";
pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const SECRET_NAME: &str = "pseudonym-key";
pub const PREVIOUS_SECRET_NAME: &str = "pseudonym-key-old";
pub const SECRET: &str = "test-secret";
pub const PREVIOUS_SECRET: &str = "rotated-secret";

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            max_body_size: 1_048_576,
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        },
        webhook: WebhookConfig {
            auth_token: WEBHOOK_TOKEN.to_string(),
        },
        admin: AdminConfig {
            api_token: ADMIN_TOKEN.to_string(),
        },
        pseudonymization: PseudonymizationConfig {
            secret_name: SECRET_NAME.to_string(),
            previous_secret_name: None,
        },
        store: StoreConfig::default(),
        rotation: RotationConfig::default(),
        aggregation: AggregationConfig::default(),
    }
}

/// App plus a handle on the store behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryTableStore>,
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

pub async fn test_app_with(config: Config) -> TestApp {
    let store = Arc::new(InMemoryTableStore::new());
    test_app_serving(config, store.clone(), store).await
}

/// App whose handlers go through `served`, a wrapper around `store`.
pub async fn test_app_serving(
    config: Config,
    served: Arc<dyn TableStore>,
    store: Arc<InMemoryTableStore>,
) -> TestApp {
    let secrets = StaticSecretStore::new()
        .with_secret(SECRET_NAME, SECRET)
        .with_secret(PREVIOUS_SECRET_NAME, PREVIOUS_SECRET);
    let state = AppState::build(config, served, Arc::new(secrets))
        .await
        .expect("Failed to build app state");
    TestApp {
        router: create_app(state),
        store,
    }
}

/// Sends a request through a clone of the router.
pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

pub fn webhook_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/activity")
        .header("content-type", "application/json")
        .header("Webhook-AuthID", WEBHOOK_TOKEN)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Admin-Token", ADMIN_TOKEN);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
