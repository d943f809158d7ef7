//! Admin operations API routes.
//!
//! These routes require the `X-Admin-Token` header.

use axum::{extract::State, Json};
use domain::services::RotationReport;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookState {
    pub paused: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct KeyRotationRequest {
    #[validate(length(min = 1, message = "previousSecretName must not be empty"))]
    pub previous_secret_name: String,
}

/// GET /api/v1/admin/webhook/state
pub async fn get_webhook_state(State(state): State<AppState>) -> Json<WebhookState> {
    Json(WebhookState {
        paused: state.pause.is_paused().await,
    })
}

/// PUT /api/v1/admin/webhook/state
pub async fn set_webhook_state(
    State(state): State<AppState>,
    Json(request): Json<WebhookState>,
) -> Result<Json<WebhookState>, ApiError> {
    state.pause.set_paused(request.paused).await?;
    info!(paused = request.paused, "Webhook state changed by admin");
    Ok(Json(request))
}

/// POST /api/v1/admin/key-rotation
///
/// Re-keys the rotation window from the named previous secret to the current
/// key. Responds 409 while another rotation is running.
pub async fn rotate_keys(
    State(state): State<AppState>,
    Json(request): Json<KeyRotationRequest>,
) -> Result<Json<RotationReport>, ApiError> {
    request.validate()?;
    info!(previous_secret = %request.previous_secret_name, "Key rotation requested by admin");
    let report = state.rotation.run_today(&request.previous_secret_name).await?;
    Ok(Json(report))
}
