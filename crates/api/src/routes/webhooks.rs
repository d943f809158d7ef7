//! Activity webhook receiver.
//!
//! Every delivery is logged to `WebhookTriggers` before anything else, so
//! rejected and paused deliveries leave a trace too.

use std::collections::BTreeMap;

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use domain::models::{ActivityRecord, WebhookTriggerEvent};
use domain::services::ProcessSummary;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{record_webhook_delivery, tokens_match};

pub const AUTH_HEADER: &str = "Webhook-AuthID";
pub const VALIDATION_CODE_HEADER: &str = "Webhook-ValidationCode";

const INVALID_AUTH: &str = "Invalid Webhook-AuthID header";
const INVALID_VALIDATION_CODE: &str = "Invalid Webhook-ValidationCode header";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ProcessSummary>,
}

impl WebhookResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            validation_code: None,
            summary: None,
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /api/v1/webhooks/activity
///
/// Accepts either a `{"validationCode": ..}` handshake or an array of
/// activity records. Records are grouped by user and each group is
/// aggregated as one batch.
pub async fn receive_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    state
        .triggers
        .record(&WebhookTriggerEvent::webhook("Webhook event"))
        .await;

    let authorized = header(&headers, AUTH_HEADER)
        .is_some_and(|provided| tokens_match(provided, &state.config.webhook.auth_token));
    if !authorized {
        warn!("Rejected webhook delivery with invalid auth header");
        state
            .triggers
            .record(&WebhookTriggerEvent::webhook(INVALID_AUTH))
            .await;
        record_webhook_delivery("unauthorized");
        return Err(ApiError::Unauthorized(INVALID_AUTH.to_string()));
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        record_webhook_delivery("rejected");
        ApiError::Validation(format!("Body is not valid JSON: {}", e))
    })?;

    if let Some(code) = payload.get("validationCode") {
        let code = code.as_str().unwrap_or_default();
        if code.is_empty() || header(&headers, VALIDATION_CODE_HEADER) != Some(code) {
            record_webhook_delivery("rejected");
            return Err(ApiError::Validation(INVALID_VALIDATION_CODE.to_string()));
        }
        info!("Webhook validation handshake accepted");
        record_webhook_delivery("handshake");
        return Ok(Json(WebhookResponse {
            validation_code: Some(code.to_string()),
            ..WebhookResponse::status("validated")
        }));
    }

    if state.pause.is_paused().await {
        info!("Webhook is paused, delivery acknowledged without processing");
        record_webhook_delivery("paused");
        return Ok(Json(WebhookResponse::status("paused")));
    }

    let records: Vec<ActivityRecord> = serde_json::from_value(payload).map_err(|e| {
        record_webhook_delivery("rejected");
        ApiError::Validation(format!("Body is not a list of activity records: {}", e))
    })?;

    let mut summary = ProcessSummary::default();
    for (user_id, batch) in group_by_user(records) {
        let processed = state.engine.process_batch(&user_id, &batch).await;
        match processed {
            Ok(batch_summary) => summary.absorb(batch_summary),
            Err(e) => {
                record_webhook_delivery(if e.is_retryable() { "failed" } else { "rejected" });
                return Err(e.into());
            }
        }
    }

    info!(
        records = summary.records,
        unclassified = summary.unclassified.len(),
        "Webhook delivery processed"
    );
    record_webhook_delivery("processed");
    Ok(Json(WebhookResponse {
        summary: Some(summary),
        ..WebhookResponse::status("processed")
    }))
}

/// Groups records by user id, keeping delivery order within each user.
fn group_by_user(records: Vec<ActivityRecord>) -> BTreeMap<String, Vec<ActivityRecord>> {
    let mut groups: BTreeMap<String, Vec<ActivityRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.user_id.clone()).or_default().push(record);
    }
    groups
}
