//! Integration tests for admin controls and health probes.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use common::{
    admin_request, send, test_app, test_app_serving, test_config, TestApp, PREVIOUS_SECRET,
    PREVIOUS_SECRET_NAME, SECRET,
};
use domain::models::{tables, ETag, TableEntity, TOTAL_INTERACTION_COUNT};
use domain::services::{InMemoryTableStore, TableStore};
use domain::StoreError;
use serde_json::json;
use shared::crypto::Pseudonymizer;
use shared::partition::day_partition_key;

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = test_app().await;

    let request = Request::builder()
        .uri("/api/v1/admin/webhook/state")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/admin/key-rotation")
        .header("X-Admin-Token", "wrong")
        .header("content-type", "application/json")
        .body(Body::from(json!({"previousSecretName": PREVIOUS_SECRET_NAME}).to_string()))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_pause_and_resume_webhook() {
    let app = test_app().await;

    let (status, body) = send(&app, admin_request("GET", "/api/v1/admin/webhook/state", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"paused": false}));

    let (status, body) = send(
        &app,
        admin_request("PUT", "/api/v1/admin/webhook/state", Some(json!({"paused": true}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"paused": true}));

    let (_, body) = send(&app, admin_request("GET", "/api/v1/admin/webhook/state", None)).await;
    assert_eq!(body, json!({"paused": true}));

    let flag = app
        .store
        .get(tables::WEBHOOK_STATE, "Webhook", "Pause")
        .await
        .unwrap()
        .expect("Pause flag missing");
    assert_eq!(flag.get_bool("IsPaused"), Some(true));

    send(
        &app,
        admin_request("PUT", "/api/v1/admin/webhook/state", Some(json!({"paused": false}))),
    )
    .await;
    let (_, body) = send(&app, admin_request("GET", "/api/v1/admin/webhook/state", None)).await;
    assert_eq!(body, json!({"paused": false}));
}

#[tokio::test]
async fn test_key_rotation_moves_counters_to_current_key() {
    let app = test_app().await;
    let today = Utc::now().date_naive();
    let previous = Pseudonymizer::derive(PREVIOUS_SECRET.as_bytes());
    let current = Pseudonymizer::derive(SECRET.as_bytes());

    let old_pk = day_partition_key(today, &previous.encode("alice@contoso.com"));
    app.store
        .insert(
            tables::DAILY_APP_USAGE,
            TableEntity::new(&old_pk, "Word").with_property(TOTAL_INTERACTION_COUNT, 4i64),
        )
        .await
        .unwrap();

    let (status, report) = send(
        &app,
        admin_request(
            "POST",
            "/api/v1/admin/key-rotation",
            Some(json!({"previousSecretName": PREVIOUS_SECRET_NAME})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["moved"], 1);
    assert_eq!(report["failed"], 0);
    assert_eq!(report["daysScanned"], 8);

    let new_pk = day_partition_key(today, &current.encode("alice@contoso.com"));
    let moved = app
        .store
        .get(tables::DAILY_APP_USAGE, &new_pk, "Word")
        .await
        .unwrap()
        .expect("Rotated counter missing");
    assert_eq!(moved.get_i64(TOTAL_INTERACTION_COUNT), Some(4));
    assert!(app
        .store
        .get(tables::DAILY_APP_USAGE, &old_pk, "Word")
        .await
        .unwrap()
        .is_none());

    // A second run finds everything already under the current key.
    let (status, report) = send(
        &app,
        admin_request(
            "POST",
            "/api/v1/admin/key-rotation",
            Some(json!({"previousSecretName": PREVIOUS_SECRET_NAME})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["moved"], 0);
    assert_eq!(report["alreadyRotated"], 1);
}

#[tokio::test]
async fn test_key_rotation_rejects_bad_requests() {
    let app = test_app().await;

    let (status, _) = send(
        &app,
        admin_request(
            "POST",
            "/api/v1/admin/key-rotation",
            Some(json!({"previousSecretName": ""})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        admin_request(
            "POST",
            "/api/v1/admin/key-rotation",
            Some(json!({"previousSecretName": "never-configured"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // Rotating onto the key already in use is refused.
    let (status, _) = send(
        &app,
        admin_request(
            "POST",
            "/api/v1/admin/key-rotation",
            Some(json!({"previousSecretName": common::SECRET_NAME})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health_probes() {
    let app = test_app().await;

    let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(&app, get("/api/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = send(&app, get("/api/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["connected"], true);
    assert_eq!(body["webhook_paused"], false);
    assert_eq!(body["rotation_running"], false);
}

#[tokio::test]
async fn test_responses_carry_request_id() {
    let app = test_app().await;
    let request = Request::builder()
        .uri("/api/health/live")
        .header("X-Request-ID", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router.clone(), request)
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me");
}

/// Table store whose day listings take a while, so a full rotation window
/// takes longer than a one second request timeout.
struct SlowListings {
    inner: Arc<InMemoryTableStore>,
}

#[async_trait::async_trait]
impl TableStore for SlowListings {
    async fn get(&self, t: &str, pk: &str, rk: &str) -> Result<Option<TableEntity>, StoreError> {
        self.inner.get(t, pk, rk).await
    }
    async fn insert(&self, t: &str, e: TableEntity) -> Result<ETag, StoreError> {
        self.inner.insert(t, e).await
    }
    async fn update(&self, t: &str, e: TableEntity, etag: &ETag) -> Result<ETag, StoreError> {
        self.inner.update(t, e, etag).await
    }
    async fn upsert(&self, t: &str, e: TableEntity) -> Result<ETag, StoreError> {
        self.inner.upsert(t, e).await
    }
    async fn delete(
        &self,
        t: &str,
        pk: &str,
        rk: &str,
        etag: Option<&ETag>,
    ) -> Result<(), StoreError> {
        self.inner.delete(t, pk, rk, etag).await
    }
    async fn query_partition_range(
        &self,
        t: &str,
        start: &str,
        end: &str,
    ) -> Result<Vec<TableEntity>, StoreError> {
        tokio::time::sleep(Duration::from_millis(60)).await;
        self.inner.query_partition_range(t, start, end).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// App with a one second request timeout over a store with slow listings,
/// seeded with one counter under the previous key. Returns the counter's
/// previous and current partition keys.
async fn slow_app_with_counter() -> (TestApp, String, String) {
    let mut config = test_config();
    config.server.request_timeout_secs = 1;
    let inner = Arc::new(InMemoryTableStore::new());
    let app = test_app_serving(
        config,
        Arc::new(SlowListings {
            inner: inner.clone(),
        }),
        inner,
    )
    .await;

    let today = Utc::now().date_naive();
    let previous = Pseudonymizer::derive(PREVIOUS_SECRET.as_bytes());
    let current = Pseudonymizer::derive(SECRET.as_bytes());
    let old_pk = day_partition_key(today, &previous.encode("alice@contoso.com"));
    let new_pk = day_partition_key(today, &current.encode("alice@contoso.com"));
    app.store
        .insert(
            tables::DAILY_APP_USAGE,
            TableEntity::new(&old_pk, "Word").with_property(TOTAL_INTERACTION_COUNT, 4i64),
        )
        .await
        .unwrap();
    (app, old_pk, new_pk)
}

fn rotation_request() -> Request<Body> {
    admin_request(
        "POST",
        "/api/v1/admin/key-rotation",
        Some(json!({"previousSecretName": PREVIOUS_SECRET_NAME})),
    )
}

#[tokio::test]
async fn test_slow_key_rotation_outlives_request_timeout() {
    let (app, old_pk, new_pk) = slow_app_with_counter().await;

    let started = std::time::Instant::now();
    let (status, report) = send(&app, rotation_request()).await;

    assert!(started.elapsed() > Duration::from_secs(1));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["moved"], 1);
    assert!(app
        .store
        .get(tables::DAILY_APP_USAGE, &old_pk, "Word")
        .await
        .unwrap()
        .is_none());
    let moved = app
        .store
        .get(tables::DAILY_APP_USAGE, &new_pk, "Word")
        .await
        .unwrap()
        .expect("Rotated counter missing");
    assert_eq!(moved.get_i64(TOTAL_INTERACTION_COUNT), Some(4));
}

#[tokio::test]
async fn test_key_rotation_finishes_after_caller_disconnects() {
    let (app, old_pk, new_pk) = slow_app_with_counter().await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(200), send(&app, rotation_request())).await;
    assert!(abandoned.is_err());

    let mut finished = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let old = app.store.get(tables::DAILY_APP_USAGE, &old_pk, "Word").await.unwrap();
        let new = app.store.get(tables::DAILY_APP_USAGE, &new_pk, "Word").await.unwrap();
        let health_request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let (_, health) = send(&app, health_request).await;
        if old.is_none() && new.is_some() && health["rotation_running"] == false {
            finished = true;
            break;
        }
    }
    assert!(finished, "rotation stopped when its request was dropped");
}
