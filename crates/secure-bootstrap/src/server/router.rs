//! Axum router construction.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// `/api/v3/ping` and `/health` are public; every other route requires a
/// verified bearer token when the state carries a verifier.
pub fn build(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v3/version", get(handlers::version))
        .route("/api/v3/secret", post(handlers::add_secret))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_jwt));

    Router::new()
        .route("/api/v3/ping", get(handlers::ping))
        .route("/health", get(handlers::health))
        .merge(protected)
        .fallback(handlers::not_found)
        .layer(from_fn(middleware::correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{keys::MockVerificationKeyLookup, JwtVerifier, KeyCache, VerificationKeyResolver};
    use crate::secret::InsecureProvider;
    use axum::{body::Body, http::Request};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::protocol::KeyData;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use std::{
        collections::HashMap,
        sync::Arc,
        time::{SystemTime, UNIX_EPOCH},
    };
    use tower::ServiceExt;

    const SECRET: &[u8] = b"router-test-hmac-key";

    fn secured_state() -> AppState {
        let mut lookup = MockVerificationKeyLookup::new();
        lookup.expect_verification_key_by_issuer().returning(|issuer| {
            Ok(KeyData {
                issuer: issuer.into(),
                key_type: "verification".into(),
                key: STANDARD.encode(SECRET),
            })
        });
        let provider = Arc::new(InsecureProvider::new("core-data", HashMap::new()));
        let resolver = VerificationKeyResolver::with_cache(Arc::new(lookup), KeyCache::new());
        let verifier = JwtVerifier::new(provider.clone(), resolver, "/v1/identity/oidc");
        AppState::new(provider, Some(Arc::new(verifier)), "core-data".into(), true)
    }

    fn token(secret: &[u8]) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            + 600;
        encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({"iss": "edgex", "exp": exp}),
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(AppState::default());
        let resp = app.oneshot(get("/unknown")).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn health_route_exists() {
        let app = build(AppState::default());
        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn correlation_id_is_echoed_or_generated() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/api/v3/ping")
            .header(middleware::CORRELATION_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[middleware::CORRELATION_ID_HEADER], "abc-123");

        let resp = app.oneshot(get("/api/v3/ping")).await.unwrap();
        let generated = resp.headers()[middleware::CORRELATION_ID_HEADER]
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(generated).is_ok());
    }

    #[tokio::test]
    async fn protected_route_requires_token() {
        let app = build(secured_state());
        let resp = app.oneshot(get("/api/v3/version")).await.unwrap();
        assert_eq!(resp.status(), 401);
        assert!(resp.headers().contains_key(middleware::CORRELATION_ID_HEADER));
    }

    #[tokio::test]
    async fn protected_route_accepts_valid_token() {
        let app = build(secured_state());
        let req = Request::builder()
            .uri("/api/v3/version")
            .header("Authorization", format!("Bearer {}", token(SECRET)))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let app = build(secured_state());
        let req = Request::builder()
            .uri("/api/v3/version")
            .header("Authorization", format!("Bearer {}", token(b"wrong-key")))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn public_routes_skip_authentication() {
        let app = build(secured_state());
        let resp = app.clone().oneshot(get("/api/v3/ping")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let resp = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
    }
}
