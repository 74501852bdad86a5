//! Axum middleware layers applied to the router.
//!
//! Includes correlation-id propagation and bearer-token authentication on top
//! of the tracing, timeout, and compression layers added in [`super::router`].

use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, SecretError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{handlers::error_response, state::AppState};

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

fn correlation_header() -> HeaderName {
    HeaderName::from_static("x-correlation-id")
}

/// Echo the caller's correlation id, or mint a UUID v4 when absent, on both
/// the request seen by handlers and the response.
pub async fn correlation_id(mut req: Request, next: Next) -> Response {
    let name = correlation_header();
    let id = match req.headers().get(&name) {
        Some(v) if !v.is_empty() => v.clone(),
        _ => {
            // A hyphenated UUID is always a valid header value.
            let generated = Uuid::new_v4().to_string();
            match HeaderValue::from_str(&generated) {
                Ok(v) => v,
                Err(_) => return next.run(req).await,
            }
        }
    };
    req.headers_mut().insert(name.clone(), id.clone());

    let mut resp = next.run(req).await;
    resp.headers_mut().insert(name, id);
    resp
}

/// Reject requests whose bearer token fails verification.
///
/// Passes everything through when the state carries no verifier.
pub async fn require_jwt(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(verifier) = state.verifier.as_ref() else {
        return next.run(req).await;
    };

    match verifier.verify_request(req.headers()).await {
        Ok(()) => next.run(req).await,
        Err(SecretError::Unauthorized(reason) | SecretError::ContractInvalid(reason)) => {
            debug!(path = %req.uri().path(), reason = %reason, "request rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "unauthorized")),
            )
                .into_response()
        }
        Err(e) => {
            warn!(path = %req.uri().path(), error = %e, "token verification could not complete");
            error_response(&e)
        }
    }
}
