//! Verification-key resolution and the per-issuer key cache.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;
use common::{
    protocol::{KeyData, KeyDataResponse},
    SecretError,
};
use jsonwebtoken::DecodingKey;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::algorithm::{parse_algorithm, AlgorithmFamily};
use crate::{secret::SecretProvider, store::url_with_segments};

#[derive(Debug, Error)]
pub enum KeyLookupError {
    /// The lookup service has no key for this issuer.
    #[error("no verification key for issuer {0}")]
    NotFound(String),

    #[error("verification key lookup failed: {0}")]
    Other(String),
}

/// Remote verification-key-by-issuer lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationKeyLookup: Send + Sync {
    async fn verification_key_by_issuer(&self, issuer: &str) -> Result<KeyData, KeyLookupError>;
}

/// Decoded verification keys by issuer.
///
/// Keyed by issuer only: the algorithm seen on the first lookup for an issuer
/// fixes the key format until the process restarts. Entries never expire.
#[derive(Clone, Default)]
pub struct KeyCache {
    inner: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by resolvers built with [`VerificationKeyResolver::new`].
    pub fn global() -> Self {
        static GLOBAL: OnceLock<KeyCache> = OnceLock::new();
        GLOBAL.get_or_init(KeyCache::new).clone()
    }

    pub async fn get(&self, issuer: &str) -> Option<DecodingKey> {
        self.inner.read().await.get(issuer).cloned()
    }

    pub async fn insert(&self, issuer: &str, key: DecodingKey) {
        self.inner.write().await.insert(issuer.to_owned(), key);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

pub struct VerificationKeyResolver {
    cache: KeyCache,
    lookup: Arc<dyn VerificationKeyLookup>,
}

impl VerificationKeyResolver {
    /// Resolver backed by the process-wide [`KeyCache`].
    pub fn new(lookup: Arc<dyn VerificationKeyLookup>) -> Self {
        Self::with_cache(lookup, KeyCache::global())
    }

    pub fn with_cache(lookup: Arc<dyn VerificationKeyLookup>, cache: KeyCache) -> Self {
        Self { cache, lookup }
    }

    /// Verification key for tokens from `issuer` signed with `alg`.
    ///
    /// # Errors
    ///
    /// - [`SecretError::ContractInvalid`] if `alg` is unsupported.
    /// - [`SecretError::KeyNotFound`] if the lookup service has no key for `issuer`.
    /// - [`SecretError::ServerError`] if the lookup fails or the key cannot be decoded.
    pub async fn get_verification_key(
        &self,
        issuer: &str,
        alg: &str,
    ) -> Result<DecodingKey, SecretError> {
        let family = AlgorithmFamily::of(parse_algorithm(alg)?);

        if let Some(key) = self.cache.get(issuer).await {
            return Ok(key);
        }

        let key_data = self
            .lookup
            .verification_key_by_issuer(issuer)
            .await
            .map_err(|e| match e {
                KeyLookupError::NotFound(issuer) => SecretError::KeyNotFound(issuer),
                KeyLookupError::Other(msg) => SecretError::ServerError(msg),
            })?;

        let key = family.decode_key(&key_data.key)?;
        self.cache.insert(issuer, key.clone()).await;
        info!(issuer, alg, "verification key cached");
        Ok(key)
    }
}

/// HTTP lookup against the key service, authenticated with the provider's
/// self JWT.
pub struct HttpKeyLookup {
    http: reqwest::Client,
    base_url: String,
    provider: Arc<dyn SecretProvider>,
}

impl HttpKeyLookup {
    pub fn new(
        base_url: impl Into<String>,
        http: reqwest::Client,
        provider: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            provider,
        }
    }
}

#[async_trait]
impl VerificationKeyLookup for HttpKeyLookup {
    async fn verification_key_by_issuer(&self, issuer: &str) -> Result<KeyData, KeyLookupError> {
        let url = url_with_segments(
            &self.base_url,
            &["api", "v3", "key", "verification", "issuer", issuer],
        )
        .map_err(KeyLookupError::Other)?;

        let jwt = self
            .provider
            .get_self_jwt()
            .await
            .map_err(|e| KeyLookupError::Other(format!("failed to obtain self JWT: {e}")))?;

        let mut req = self.http.get(url);
        if !jwt.is_empty() {
            req = req.bearer_auth(jwt);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| KeyLookupError::Other(e.to_string()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(KeyLookupError::NotFound(issuer.to_owned())),
            status if !status.is_success() => Err(KeyLookupError::Other(format!(
                "key lookup for issuer {issuer} returned {status}"
            ))),
            _ => {
                let body: KeyDataResponse = resp
                    .json()
                    .await
                    .map_err(|e| KeyLookupError::Other(e.to_string()))?;
                debug!(issuer, "verification key fetched");
                Ok(body.key_data)
            }
        }
    }
}
