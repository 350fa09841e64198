//! API handlers for the EchoMind server.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use echomind_voice::JoinToken;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Request body for join-token issuance. The body itself is optional.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    /// Participant metadata embedded in the token, e.g. the user profile.
    #[serde(default)]
    pub metadata: Value,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `GET|POST /api/token`.
///
/// Issues a token for a freshly named room and identity. An empty body is
/// the same as `{"metadata": {}}`.
pub async fn token_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<JoinToken>, ApiError> {
    if !state.token_issuer.is_configured() {
        tracing::error!("LiveKit API key or secret is not configured");
        return Err(ApiError::InternalServerError(
            "Environment variables aren't set up correctly".to_string(),
        ));
    }

    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TokenRequest::default()
    } else {
        serde_json::from_slice::<TokenRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let metadata = match request.metadata {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };

    let token = state.token_issuer.issue(&metadata).map_err(|e| {
        tracing::error!("failed to issue join token: {}", e);
        ApiError::InternalServerError(e.to_string())
    })?;

    tracing::info!(
        identity = %token.identity,
        room = %token.room_name,
        "issued join token"
    );
    Ok(Json(token))
}
