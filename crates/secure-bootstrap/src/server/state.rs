//! Shared application state injected into every Axum handler.

use std::{collections::HashMap, sync::Arc};

use crate::jwt::JwtVerifier;
use crate::secret::{InsecureProvider, SecretProvider};

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Provider the service was brought up with.
    pub provider: Arc<dyn SecretProvider>,
    /// `None` when JWT validation is off (security disabled or explicitly opted out).
    pub verifier: Option<Arc<JwtVerifier>>,
    pub service_key: Arc<String>,
    pub security_enabled: bool,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn SecretProvider>,
        verifier: Option<Arc<JwtVerifier>>,
        service_key: String,
        security_enabled: bool,
    ) -> Self {
        Self {
            provider,
            verifier,
            service_key: Arc::new(service_key),
            security_enabled,
        }
    }
}

impl Default for AppState {
    /// Insecure provider with no secrets and no JWT validation, for tests.
    fn default() -> Self {
        Self::new(
            Arc::new(InsecureProvider::new("secure-bootstrap", HashMap::new())),
            None,
            "secure-bootstrap".into(),
            false,
        )
    }
}
