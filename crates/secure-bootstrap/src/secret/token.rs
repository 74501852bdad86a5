//! Where secret-store tokens come from: a token file on disk, or the runtime
//! token provider.

use async_trait::async_trait;
use common::protocol::{RuntimeTokenRequest, TokenAuth, TokenFile};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenSourceError {
    #[error("failed to read token file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("malformed token: {0}")]
    Decode(String),

    #[error("runtime token request failed: {0}")]
    Request(String),
}

/// Loads the token file written for this service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthTokenLoader: Send + Sync {
    async fn load(&self, path: &str) -> Result<TokenAuth, TokenSourceError>;
}

/// Obtains a fresh token for a service at runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuntimeTokenSource: Send + Sync {
    async fn get_token(&self, service_key: &str) -> Result<TokenAuth, TokenSourceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileTokenLoader;

#[async_trait]
impl AuthTokenLoader for FileTokenLoader {
    async fn load(&self, path: &str) -> Result<TokenAuth, TokenSourceError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TokenSourceError::Io {
                path: path.to_owned(),
                reason: e.to_string(),
            })?;
        let file: TokenFile =
            serde_json::from_str(&raw).map_err(|e| TokenSourceError::Decode(e.to_string()))?;
        ensure_token(file.auth)
    }
}

/// Runtime token provider reached over HTTP: POSTs the service key and reads
/// back a token document in token-file format.
#[derive(Clone)]
pub struct HttpRuntimeTokenSource {
    http: reqwest::Client,
    url: String,
}

impl HttpRuntimeTokenSource {
    pub fn new(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RuntimeTokenSource for HttpRuntimeTokenSource {
    async fn get_token(&self, service_key: &str) -> Result<TokenAuth, TokenSourceError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&RuntimeTokenRequest {
                service_key: service_key.to_owned(),
            })
            .send()
            .await
            .map_err(|e| TokenSourceError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TokenSourceError::Request(format!(
                "runtime token provider returned {status}"
            )));
        }

        let file: TokenFile = resp
            .json()
            .await
            .map_err(|e| TokenSourceError::Decode(e.to_string()))?;
        debug!(service_key, "runtime token obtained");
        ensure_token(file.auth)
    }
}

fn ensure_token(auth: TokenAuth) -> Result<TokenAuth, TokenSourceError> {
    if auth.client_token.trim().is_empty() {
        return Err(TokenSourceError::Decode("client_token is empty".into()));
    }
    Ok(auth)
}
