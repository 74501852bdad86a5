//! Axum request handlers for all service endpoints.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{
    protocol::{
        AddSecretRequest, BaseResponse, ErrorResponse, HealthResponse, PingResponse,
        VersionResponse, API_VERSION,
    },
    SecretError,
};
use tracing::{error, warn};

use super::state::AppState;
use crate::store::validate_secret_name;

/// Map a [`SecretError`] to a response. Internal failures are logged and
/// reported without detail.
pub fn error_response(err: &SecretError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let message = match err {
        SecretError::Unauthorized(_) => "unauthorized".to_owned(),
        _ if status.is_server_error() => {
            error!(error = %err, "request failed");
            "internal error".to_owned()
        }
        other => other.to_string(),
    };

    (status, Json(ErrorResponse::new(err.code(), message))).into_response()
}

/// `GET /api/v3/ping`
pub async fn ping(State(state): State<AppState>) -> Json<PingResponse> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    Json(PingResponse {
        api_version: API_VERSION.into(),
        timestamp,
        service_name: state.service_key.to_string(),
    })
}

/// `GET /api/v3/version`
pub async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        api_version: API_VERSION.into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service_name: state.service_key.to_string(),
    })
}

/// `GET /health`: provider mode and usage counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let metrics = state.provider.metrics();
    Json(HealthResponse {
        status: "ok".into(),
        security_enabled: state.security_enabled,
        zero_trust_enabled: state.provider.is_zero_trust_enabled(),
        secrets_requested: metrics.secrets_requested,
        secrets_stored: metrics.secrets_stored,
    })
}

/// `POST /api/v3/secret`: store a secret group for this service.
pub async fn add_secret(
    State(state): State<AppState>,
    Json(req): Json<AddSecretRequest>,
) -> Response {
    if let Err(e) = validate_secret_name(&req.secret_name) {
        return error_response(&SecretError::from(e));
    }
    if req.secret_data.is_empty() || req.secret_data.iter().any(|kv| kv.key.is_empty()) {
        return error_response(&SecretError::ContractInvalid(
            "secretData must contain at least one entry with a non-empty key".into(),
        ));
    }

    match state.provider.save_secret(&req.secret_name, req.data_map()).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(BaseResponse::new(StatusCode::CREATED.as_u16())),
        )
            .into_response(),
        Err(e) => {
            warn!(secret_name = %req.secret_name, error = %e, "add secret failed");
            error_response(&e)
        }
    }
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
