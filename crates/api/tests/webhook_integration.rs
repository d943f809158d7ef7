//! Integration tests for the activity webhook.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{send, test_app, test_app_with, test_config, webhook_request};
use domain::models::{tables, OCCURRENCE_COUNT, TOTAL_INTERACTION_COUNT};
use domain::services::TableStore;
use serde_json::json;

/// Token of alice@contoso.com under the "test-secret" key.
const ALICE_TOKEN: &str = "ITjxQJyxE2Y9EYSPMvTE8hmL0JLkg7SSypfyFz/GgTw=";

fn record(app_host: &str, user_id: &str) -> serde_json::Value {
    json!({"appHost": app_host, "eventDate": "2024-05-01", "userId": user_id})
}

#[tokio::test]
async fn test_delivery_is_aggregated_per_user() {
    let app = test_app().await;

    let body = json!([
        record("Word", "alice@contoso.com"),
        record("Word", "alice@contoso.com"),
        {
            "appHost": "Teams",
            "eventDate": "2024-05-01",
            "userId": "alice@contoso.com",
            "contexts": [{"type": "TeamsMeeting"}],
            "pluginIds": ["BingWebSearch"]
        },
        {
            "appHost": "Office",
            "eventDate": "2024-05-01",
            "userId": "bob@contoso.com",
            "agentId": "agent-1",
            "agentName": "Planner"
        },
        record("SomethingNew", "carol@contoso.com"),
    ]);

    let (status, response) = send(&app, webhook_request(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "processed");
    let summary = &response["summary"];
    assert_eq!(summary["records"], 5);
    assert_eq!(summary["classified"]["Word"], 2);
    assert_eq!(summary["classified"]["Teams"], 1);
    assert_eq!(summary["classified"]["Agent"], 1);
    assert_eq!(summary["unclassified"], json!(["SomethingNew"]));
    assert_eq!(summary["agents"]["agent-1"], 1);
    assert_eq!(summary["webPlugin"], 1);

    let alice_pk = format!("2024-05-01-{}", ALICE_TOKEN);
    let word = app
        .store
        .get(tables::DAILY_APP_USAGE, &alice_pk, "Word")
        .await
        .unwrap()
        .expect("Word counter missing");
    assert_eq!(word.get_i64(TOTAL_INTERACTION_COUNT), Some(2));
    let web = app
        .store
        .get(tables::DAILY_APP_USAGE, &alice_pk, "WebPlugin")
        .await
        .unwrap()
        .expect("WebPlugin counter missing");
    assert_eq!(web.get_i64(TOTAL_INTERACTION_COUNT), Some(1));

    let agents = app.store.snapshot(tables::DAILY_AGENT_USAGE);
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].row_key, "agent-1");
    assert_eq!(agents[0].get_str("AgentName"), Some("Planner"));

    let unhandled = app
        .store
        .get(tables::UNHANDLED_APP_HOSTS, "SomethingNew", "SomethingNew")
        .await
        .unwrap()
        .expect("Unhandled host missing");
    assert_eq!(unhandled.get_i64(OCCURRENCE_COUNT), Some(1));

    // Plaintext user ids never reach storage.
    for table in [tables::DAILY_APP_USAGE, tables::DAILY_AGENT_USAGE] {
        for entity in app.store.snapshot(table) {
            assert!(!entity.partition_key.contains("@contoso.com"));
        }
    }

    assert_eq!(app.store.snapshot(tables::WEBHOOK_TRIGGERS).len(), 1);
}

#[tokio::test]
async fn test_redelivery_counts_again() {
    let app = test_app().await;
    let body = json!([record("Excel", "alice@contoso.com")]);

    send(&app, webhook_request(body.clone())).await;
    send(&app, webhook_request(body)).await;

    let pk = format!("2024-05-01-{}", ALICE_TOKEN);
    let excel = app
        .store
        .get(tables::DAILY_APP_USAGE, &pk, "Excel")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(excel.get_i64(TOTAL_INTERACTION_COUNT), Some(2));
}

#[tokio::test]
async fn test_invalid_auth_is_rejected_and_logged() {
    let app = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/activity")
        .header("Webhook-AuthID", "wrong")
        .body(Body::from(json!([record("Word", "alice@contoso.com")]).to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid Webhook-AuthID header");

    let triggers = app.store.snapshot(tables::WEBHOOK_TRIGGERS);
    assert_eq!(triggers.len(), 2);
    assert!(triggers
        .iter()
        .any(|t| t.get_str("EventDetails") == Some("Invalid Webhook-AuthID header")));
    assert!(app.store.snapshot(tables::DAILY_APP_USAGE).is_empty());
}

#[tokio::test]
async fn test_missing_auth_header_is_rejected() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/activity")
        .body(Body::from("[]"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validation_handshake() {
    let app = test_app().await;

    let mut request = webhook_request(json!({"validationCode": "abc123"}));
    request
        .headers_mut()
        .insert("Webhook-ValidationCode", "abc123".parse().unwrap());
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "validated");
    assert_eq!(body["validationCode"], "abc123");

    let mut request = webhook_request(json!({"validationCode": "abc123"}));
    request
        .headers_mut()
        .insert("Webhook-ValidationCode", "other".parse().unwrap());
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid Webhook-ValidationCode header");
}

#[tokio::test]
async fn test_paused_delivery_is_acknowledged_without_processing() {
    let app = test_app().await;
    let (status, _) = send(
        &app,
        common::admin_request(
            "PUT",
            "/api/v1/admin/webhook/state",
            Some(json!({"paused": true})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        webhook_request(json!([record("Word", "alice@contoso.com")])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "paused"}));
    assert!(app.store.snapshot(tables::DAILY_APP_USAGE).is_empty());
    assert_eq!(app.store.snapshot(tables::WEBHOOK_TRIGGERS).len(), 1);
}

#[tokio::test]
async fn test_invalid_record_rejects_whole_user_batch() {
    let app = test_app().await;
    let body = json!([
        record("Word", "alice@contoso.com"),
        record("", "alice@contoso.com"),
    ]);

    let (status, body) = send(&app, webhook_request(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert!(app.store.snapshot(tables::DAILY_APP_USAGE).is_empty());
}

#[tokio::test]
async fn test_malformed_bodies_are_rejected() {
    let app = test_app().await;

    let mut request = webhook_request(json!([]));
    *request.body_mut() = Body::from("not json");
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, webhook_request(json!({"value": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, webhook_request(json!([{"appHost": "Word"}]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_delivery() {
    let app = test_app().await;
    let (status, body) = send(&app, webhook_request(json!([]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["records"], 0);
}

#[tokio::test]
async fn test_detail_rows_when_enabled() {
    let mut config = test_config();
    config.aggregation.record_details = true;
    let app = test_app_with(config).await;

    let body = json!([{
        "id": "rec-1",
        "appHost": "Word",
        "eventDate": "2024-05-01",
        "userId": "alice@contoso.com",
        "pluginIds": ["BingWebSearch"]
    }]);
    let (status, _) = send(&app, webhook_request(body)).await;
    assert_eq!(status, StatusCode::OK);

    let details = app.store.snapshot(tables::INTERACTION_DETAILS);
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].partition_key, format!("2024-05-01-{}", ALICE_TOKEN));
    assert_eq!(details[0].row_key, "rec-1");
    assert_eq!(details[0].get_str("AISystemPlugin"), Some("BingWebSearch"));
}

#[tokio::test]
async fn test_many_users_get_separate_counters() {
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use shared::crypto::Pseudonymizer;
    use std::collections::BTreeSet;

    let app = test_app().await;
    let users: BTreeSet<String> = (0..20).map(|_| SafeEmail().fake()).collect();
    let records: Vec<_> = users
        .iter()
        .flat_map(|user| [record("Loop", user), record("Loop", user)])
        .collect();

    let (status, body) = send(&app, webhook_request(json!(records))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["records"], users.len() * 2);

    let key = Pseudonymizer::derive(common::SECRET.as_bytes());
    let counters = app.store.snapshot(tables::DAILY_APP_USAGE);
    assert_eq!(counters.len(), users.len());
    for user in &users {
        let pk = format!("2024-05-01-{}", key.encode(user));
        let counter = app
            .store
            .get(tables::DAILY_APP_USAGE, &pk, "Loop")
            .await
            .unwrap()
            .expect("Per-user counter missing");
        assert_eq!(counter.get_i64(TOTAL_INTERACTION_COUNT), Some(2));
    }
}
