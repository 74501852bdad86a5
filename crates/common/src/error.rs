//! Common error types shared across crates.

use thiserror::Error;

/// Error kinds surfaced by the secret provider and the JWT pipeline.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`SecretError::Unauthorized`] → 401
/// - [`SecretError::ContractInvalid`] → 400
/// - [`SecretError::SecretNotFound`] → 404
/// - [`SecretError::DuplicateCallback`] → 409
/// - [`SecretError::NotInitialized`] → 503
/// - everything else → 500
///
/// Messages carry the operation and the offending identifier, never secret
/// values or tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// No backing secret-store client has been attached to the provider yet.
    #[error("secret provider not initialized: {0}")]
    NotInitialized(String),

    /// The named secret group, or one of the requested keys, does not exist.
    #[error("secret not found: {0}")]
    SecretNotFound(String),

    /// The backing store rejected our credential (403-class) and the single
    /// reload-and-retry did not recover.
    #[error("secret store rejected credentials: {0}")]
    AuthRejected(String),

    /// An inbound JWT is missing, malformed, or failed verification.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An internal or infrastructure failure.
    #[error("server error: {0}")]
    ServerError(String),

    /// The remote key provider has no verification key for an issuer.
    #[error("no verification key configured for issuer {0}")]
    KeyNotFound(String),

    /// The caller supplied input outside the supported contract.
    #[error("contract invalid: {0}")]
    ContractInvalid(String),

    /// A secret-updated callback is already registered under this name.
    #[error("callback already registered for secret name {0}")]
    DuplicateCallback(String),
}

impl SecretError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            SecretError::Unauthorized(_) => 401,
            SecretError::ContractInvalid(_) => 400,
            SecretError::SecretNotFound(_) => 404,
            SecretError::DuplicateCallback(_) => 409,
            SecretError::NotInitialized(_) => 503,
            SecretError::AuthRejected(_)
            | SecretError::ServerError(_)
            | SecretError::KeyNotFound(_) => 500,
        }
    }

    /// Short machine-readable code used in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            SecretError::NotInitialized(_) => "not_initialized",
            SecretError::SecretNotFound(_) => "secret_not_found",
            SecretError::AuthRejected(_) => "secret_store_auth_rejected",
            SecretError::Unauthorized(_) => "unauthorized",
            SecretError::ServerError(_) => "internal_error",
            SecretError::KeyNotFound(_) => "verification_key_not_configured",
            SecretError::ContractInvalid(_) => "contract_invalid",
            SecretError::DuplicateCallback(_) => "duplicate_callback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_codes() {
        assert_eq!(SecretError::Unauthorized("x".into()).http_status(), 401);
        assert_eq!(SecretError::ContractInvalid("x".into()).http_status(), 400);
        assert_eq!(SecretError::SecretNotFound("x".into()).http_status(), 404);
        assert_eq!(SecretError::DuplicateCallback("x".into()).http_status(), 409);
        assert_eq!(SecretError::NotInitialized("x".into()).http_status(), 503);
        assert_eq!(SecretError::AuthRejected("x".into()).http_status(), 500);
        assert_eq!(SecretError::KeyNotFound("x".into()).http_status(), 500);
        assert_eq!(SecretError::ServerError("x".into()).http_status(), 500);
    }

    #[test]
    fn display_includes_identifier() {
        let e = SecretError::DuplicateCallback("mqtt".into());
        assert!(e.to_string().contains("mqtt"));
        assert_eq!(e.code(), "duplicate_callback");
    }
}
