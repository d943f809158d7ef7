//! Admin token middleware.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::app::AppState;
use crate::error::ApiError;

/// Header carrying the admin API token.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Compares two secrets through their digests so the comparison time does
/// not depend on where they first differ.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Rejects requests whose `X-Admin-Token` does not match `admin.api_token`.
pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if tokens_match(token, &state.config.admin.api_token) => next.run(req).await,
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Rejected admin request with wrong token");
            ApiError::Unauthorized("Invalid admin token".into()).into_response()
        }
        None => ApiError::Unauthorized("Missing admin token".into()).into_response(),
    }
}
