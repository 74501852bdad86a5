//! Request and response types exchanged between components.
//!
//! These types are serialised as JSON over the public HTTP API, over the
//! calls to the secret-store collaborators, and in the on-disk token and
//! seed-secrets files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// API version reported in every response envelope.
pub const API_VERSION: &str = "v3";

// ---------------------------------------------------------------------------
// Secret payloads
// ---------------------------------------------------------------------------

/// A single key/value pair inside a secret group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDataKeyValue {
    pub key: String,
    pub value: String,
}

/// Request body for `POST /api/v3/secret`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSecretRequest {
    /// Name of the secret group to write (e.g. `"mqtt"`).
    pub secret_name: String,
    /// Key/value pairs stored under the group.
    pub secret_data: Vec<SecretDataKeyValue>,
}

impl AddSecretRequest {
    /// Collapse the key/value list into a map. Later duplicates win.
    pub fn data_map(&self) -> HashMap<String, String> {
        self.secret_data
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Response envelopes
// ---------------------------------------------------------------------------

/// Minimal success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseResponse {
    pub api_version: String,
    pub status_code: u16,
}

impl BaseResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            api_version: API_VERSION.into(),
            status_code,
        }
    }
}

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"unauthorized"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Response body for `GET /api/v3/ping`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub api_version: String,
    /// UNIX timestamp (seconds) at which the ping was served.
    pub timestamp: u64,
    pub service_name: String,
}

/// Response body for `GET /api/v3/version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse {
    pub api_version: String,
    pub version: String,
    pub service_name: String,
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the service runs with the secure provider.
    pub security_enabled: bool,
    /// Whether zero-trust transport has been enabled on the provider.
    pub zero_trust_enabled: bool,
    /// Number of secret retrievals requested since startup.
    pub secrets_requested: u64,
    /// Number of secret writes requested since startup.
    pub secrets_stored: u64,
}

// ---------------------------------------------------------------------------
// Verification key lookup
// ---------------------------------------------------------------------------

/// Key material returned by the verification-key lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyData {
    pub issuer: String,
    #[serde(rename = "type", default)]
    pub key_type: String,
    /// Base64 secret (HMAC) or PEM public key (RSA, EC, Ed25519).
    pub key: String,
}

/// Envelope around [`KeyData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDataResponse {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub status_code: u16,
    pub key_data: KeyData,
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// On-disk (and runtime-provider) token document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFile {
    pub auth: TokenAuth,
}

/// Authentication block of a [`TokenFile`].
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenAuth {
    pub client_token: String,
    /// Identity entity the token belongs to; needed to regenerate it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth")
            .field("client_token", &"[REDACTED]")
            .field("entity_id", &self.entity_id)
            .finish()
    }
}

/// Request body sent to the runtime token provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeTokenRequest {
    pub service_key: String,
}

// ---------------------------------------------------------------------------
// Seed secrets file
// ---------------------------------------------------------------------------

/// JSON document of secrets to import into the store at bring-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsFile {
    #[serde(default)]
    pub secrets: Vec<SeedSecret>,
}

/// One named entry of a [`SecretsFile`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSecret {
    pub secret_name: String,
    #[serde(default)]
    pub imported: bool,
    #[serde(default)]
    pub secret_data: Vec<SecretDataKeyValue>,
}

impl SeedSecret {
    /// Collapse the key/value list into a map.
    pub fn data_map(&self) -> HashMap<String, String> {
        self.secret_data
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_secret_request_uses_camel_case() {
        let req: AddSecretRequest = serde_json::from_str(
            r#"{"secretName":"mqtt","secretData":[{"key":"username","value":"u"}]}"#,
        )
        .unwrap();
        assert_eq!(req.secret_name, "mqtt");
        assert_eq!(req.data_map().get("username").map(String::as_str), Some("u"));
    }

    #[test]
    fn error_response_new() {
        let e = ErrorResponse::new("unauthorized", "unauthorized");
        assert_eq!(e.code, "unauthorized");
    }

    #[test]
    fn key_data_reads_type_field() {
        let resp: KeyDataResponse = serde_json::from_str(
            r#"{"apiVersion":"v3","statusCode":200,"keyData":{"issuer":"edgex","type":"verification","key":"abc"}}"#,
        )
        .unwrap();
        assert_eq!(resp.key_data.key_type, "verification");
        assert_eq!(resp.key_data.key, "abc");
    }

    #[test]
    fn token_auth_debug_is_redacted() {
        let auth = TokenAuth {
            client_token: "s.secret".into(),
            entity_id: Some("e1".into()),
        };
        let printed = format!("{auth:?}");
        assert!(!printed.contains("s.secret"));
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn seed_file_defaults_imported_to_false() {
        let file: SecretsFile = serde_json::from_str(
            r#"{"secrets":[{"secretName":"db","secretData":[{"key":"password","value":"p"}]}]}"#,
        )
        .unwrap();
        assert!(!file.secrets[0].imported);
        assert_eq!(file.secrets[0].data_map().len(), 1);
    }
}
