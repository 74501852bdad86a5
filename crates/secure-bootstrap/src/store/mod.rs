//! Clients for the backing secret store and its setup service.
//!
//! The provider only ever talks to the store through [`SecretStoreClient`];
//! the HTTP implementation speaks a Vault-compatible KV API.
//!
//! # Error taxonomy
//!
//! Every call reports a [`SecretStoreError`]. Only
//! [`SecretStoreError::AuthRejected`] (a 403-class rejection of our token)
//! drives the reload-and-retry path; everything else is surfaced as-is.

pub mod http;
pub mod setup;

pub use http::{HttpSecretStoreClient, HttpSecretStoreConnector};
pub use setup::{HttpSecretStoreSetupClient, SecretStoreSetupClient};
#[cfg(test)]
pub use setup::MockSecretStoreSetupClient;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use common::SecretError;
use reqwest::Url;
use thiserror::Error;

/// Errors reported by the backing store and the services around it.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The secret group, or a requested key in it, does not exist.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The store rejected our token (HTTP 403).
    #[error("request rejected by secret store: {0}")]
    AuthRejected(String),

    /// Any other non-success status.
    #[error("secret store returned status {status} for {context}")]
    Status { status: u16, context: String },

    /// The request never produced a response.
    #[error("secret store request failed: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("failed to decode secret store response: {0}")]
    Decode(String),

    /// The token cannot be used as a request credential.
    #[error("invalid auth token: {0}")]
    InvalidToken(String),

    /// The secret name cannot be used as a single store path segment.
    #[error("invalid secret name: {0}")]
    InvalidName(String),
}

impl SecretStoreError {
    /// `true` for the stale/invalid credential rejection that warrants a token reload.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, SecretStoreError::AuthRejected(_))
    }
}

impl From<SecretStoreError> for SecretError {
    fn from(err: SecretStoreError) -> Self {
        match err {
            SecretStoreError::NotFound(name) => SecretError::SecretNotFound(name),
            SecretStoreError::AuthRejected(msg) => SecretError::AuthRejected(msg),
            SecretStoreError::InvalidName(msg) => SecretError::ContractInvalid(msg),
            other => SecretError::ServerError(other.to_string()),
        }
    }
}

/// Connection settings for one backing-store client.
#[derive(Clone)]
pub struct SecretStoreConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// KV mount (e.g. `"secret"`).
    pub mount: String,
    /// Path under the mount holding this service's groups (e.g. `"edgex/core-data"`).
    pub base_path: String,
    /// Token presented on every request.
    pub token: String,
}

impl SecretStoreConfig {
    /// `protocol://host:port` without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl std::fmt::Debug for SecretStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStoreConfig")
            .field("base_url", &self.base_url())
            .field("mount", &self.mount)
            .field("base_path", &self.base_path)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Operations the provider needs from the backing store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStoreClient: Send + Sync {
    /// Fetch `keys` of group `secret_name`; all keys when `keys` is empty.
    async fn get_secrets(
        &self,
        secret_name: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, SecretStoreError>;

    /// Write `data` to group `secret_name`.
    async fn store_secrets(
        &self,
        secret_name: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), SecretStoreError>;

    /// Names of every group stored for this service.
    async fn get_secret_names(&self) -> Result<Vec<String>, SecretStoreError>;

    /// Replace the token presented on subsequent requests.
    fn set_auth_token(&self, token: &str) -> Result<(), SecretStoreError>;

    /// Mint an identity JWT for `service_key`.
    async fn get_self_jwt(&self, service_key: &str) -> Result<String, SecretStoreError>;

    /// Ask the store whether `jwt` is currently valid.
    async fn is_jwt_valid(&self, jwt: &str) -> Result<bool, SecretStoreError>;

    /// Extend the lifetime of the current token.
    async fn renew_token(&self) -> Result<(), SecretStoreError>;
}

/// Builds clients from connection settings; bring-up retries through this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStoreConnector: Send + Sync {
    async fn connect(
        &self,
        config: &SecretStoreConfig,
    ) -> Result<Arc<dyn SecretStoreClient>, SecretStoreError>;
}

/// Check that `name` names exactly one group under the service's path.
///
/// Rejects empty names, `/`, `.`/`..` and control characters.
pub fn validate_secret_name(name: &str) -> Result<(), SecretStoreError> {
    let invalid = |why: &str| Err(SecretStoreError::InvalidName(format!("{name:?}: {why}")));
    if name.trim().is_empty() {
        return invalid("must not be empty");
    }
    if name == "." || name.contains("..") {
        return invalid("must not contain '..'");
    }
    if name.contains('/') || name.contains('\\') {
        return invalid("must not contain path separators");
    }
    if name.chars().any(char::is_control) {
        return invalid("must not contain control characters");
    }
    Ok(())
}

/// Append `segments` to `base`, percent-encoding each one.
pub(crate) fn url_with_segments(base: &str, segments: &[&str]) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| format!("invalid base URL {base}: {e}"))?;
    url.path_segments_mut()
        .map_err(|_| format!("base URL {base} cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejected_maps_to_auth_kind() {
        let err = SecretStoreError::AuthRejected("403".into());
        assert!(err.is_auth_rejected());
        assert!(matches!(SecretError::from(err), SecretError::AuthRejected(_)));
    }

    #[test]
    fn not_found_maps_to_secret_not_found() {
        let err: SecretError = SecretStoreError::NotFound("mqtt".into()).into();
        assert_eq!(err, SecretError::SecretNotFound("mqtt".into()));
    }

    #[test]
    fn other_errors_map_to_server_error() {
        let err: SecretError = SecretStoreError::Status {
            status: 500,
            context: "read mqtt".into(),
        }
        .into();
        assert!(matches!(err, SecretError::ServerError(_)));
    }

    #[test]
    fn config_debug_hides_token() {
        let cfg = SecretStoreConfig {
            protocol: "http".into(),
            host: "localhost".into(),
            port: 8200,
            mount: "secret".into(),
            base_path: "edgex/core-data".into(),
            token: "s.very-secret".into(),
        };
        let printed = format!("{cfg:?}");
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("http://localhost:8200"));
    }

    #[test]
    fn url_segments_are_encoded() {
        let url = url_with_segments("http://localhost:59842/", &["api", "v3", "issuer", "/v1/identity/oidc"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:59842/api/v3/issuer/%2Fv1%2Fidentity%2Foidc"
        );
    }

    #[test]
    fn secret_names_must_be_one_segment() {
        for ok in ["db", "mqtt-broker", "app.credentials", "redis_2"] {
            assert!(validate_secret_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", " ", ".", "..", "../x", "a/b", "a\\b", "db\n", "x..y"] {
            assert!(
                matches!(validate_secret_name(bad), Err(SecretStoreError::InvalidName(_))),
                "{bad:?}"
            );
        }
        let err: SecretError = SecretStoreError::InvalidName("../x".into()).into();
        assert!(matches!(err, SecretError::ContractInvalid(_)));
    }
}
