//! [`SecureProvider`]: secret access backed by the secret store.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock, RwLock,
    },
    time::{Instant, SystemTime},
};

use async_trait::async_trait;
use common::SecretError;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    cache::SecretsCache,
    callbacks::{CallbackRegistry, SecretUpdatedCallback},
    metrics::{MetricsSnapshot, ProviderMetrics},
    token::{AuthTokenLoader, RuntimeTokenSource},
    transport::FallbackDialer,
    SecretProvider,
};
use crate::store::SecretStoreClient;

/// Service-key prefix of application services.
pub const APP_SERVICE_PREFIX: &str = "app-";

/// Identity shared by application services when the common key is enabled.
pub const COMMON_APP_SERVICE_KEY: &str = "app-service-common";

/// Provider backed by the secret store.
///
/// Built without a client; bring-up attaches one with [`Self::set_client`].
/// Until then every store-backed operation fails with
/// [`SecretError::NotInitialized`].
pub struct SecureProvider {
    service_key: String,
    use_common_app_service_key: bool,
    client: RwLock<Option<Arc<dyn SecretStoreClient>>>,
    /// Last token pushed into `client` by this provider.
    current_token: RwLock<String>,
    token_loader: Arc<dyn AuthTokenLoader>,
    token_file: Option<String>,
    runtime_token_source: Option<Arc<dyn RuntimeTokenSource>>,
    cache: SecretsCache,
    callbacks: CallbackRegistry,
    metrics: ProviderMetrics,
    /// Serialises reload-and-retry so concurrent auth failures do not race
    /// each other pushing tokens into the client.
    pub(super) reload_lock: Mutex<()>,
    zero_trust: AtomicBool,
    http_transport: OnceLock<reqwest::Client>,
    fallback_dialer: OnceLock<Arc<dyn FallbackDialer>>,
}

impl SecureProvider {
    pub fn new(service_key: impl Into<String>, token_loader: Arc<dyn AuthTokenLoader>) -> Self {
        let service_key = service_key.into();
        let metrics = ProviderMetrics::new(&service_key);
        Self {
            service_key,
            use_common_app_service_key: false,
            client: RwLock::new(None),
            current_token: RwLock::new(String::new()),
            token_loader,
            token_file: None,
            runtime_token_source: None,
            cache: SecretsCache::new(),
            callbacks: CallbackRegistry::new(),
            metrics,
            reload_lock: Mutex::new(()),
            zero_trust: AtomicBool::new(false),
            http_transport: OnceLock::new(),
            fallback_dialer: OnceLock::new(),
        }
    }

    /// Token file re-read on auth failures in file mode.
    pub fn with_token_file(mut self, path: impl Into<String>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// Switch to runtime-token mode.
    pub fn with_runtime_token_source(mut self, source: Arc<dyn RuntimeTokenSource>) -> Self {
        self.runtime_token_source = Some(source);
        self
    }

    pub fn with_common_app_service_key(mut self, enabled: bool) -> Self {
        self.use_common_app_service_key = enabled;
        self
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    pub fn is_runtime_token_mode(&self) -> bool {
        self.runtime_token_source.is_some()
    }

    /// Attach (or replace) the backing-store client.
    pub fn set_client(&self, client: Arc<dyn SecretStoreClient>) {
        *self
            .client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(client);
    }

    /// Attach a client that was connected with `token`.
    pub fn attach_client(&self, client: Arc<dyn SecretStoreClient>, token: String) {
        self.set_client(client);
        self.record_token(token);
    }

    /// Token the client currently presents, as far as this provider knows.
    pub fn current_token(&self) -> String {
        self.current_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(super) fn record_token(&self, token: String) {
        *self
            .current_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    pub fn client(&self) -> Option<Arc<dyn SecretStoreClient>> {
        self.client
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn require_client(&self) -> Result<Arc<dyn SecretStoreClient>, SecretError> {
        self.client().ok_or_else(|| {
            SecretError::NotInitialized("secret store client has not been set".into())
        })
    }

    /// Identity the self JWT is minted for.
    pub fn jwt_identity(&self) -> &str {
        if self.use_common_app_service_key && self.service_key.starts_with(APP_SERVICE_PREFIX) {
            COMMON_APP_SERVICE_KEY
        } else {
            &self.service_key
        }
    }

    pub fn enable_zero_trust(&self) {
        if !self.zero_trust.swap(true, Ordering::SeqCst) {
            info!(service_key = %self.service_key, "zero trust enabled");
        }
    }

    /// Set the transport used for zero-trust traffic. Only the first call
    /// takes effect; returns whether this one did.
    pub fn set_http_transport(&self, transport: reqwest::Client) -> bool {
        let applied = self.http_transport.set(transport).is_ok();
        if !applied {
            warn!("http transport already set; ignoring replacement");
        }
        applied
    }

    pub fn http_transport(&self) -> Option<reqwest::Client> {
        self.http_transport.get().cloned()
    }

    /// Set the dialer for destinations outside the zero-trust overlay. Only
    /// the first call takes effect; returns whether this one did.
    pub fn set_fallback_dialer(&self, dialer: Arc<dyn FallbackDialer>) -> bool {
        let applied = self.fallback_dialer.set(dialer).is_ok();
        if !applied {
            warn!("fallback dialer already set; ignoring replacement");
        }
        applied
    }

    pub fn fallback_dialer(&self) -> Option<Arc<dyn FallbackDialer>> {
        self.fallback_dialer.get().cloned()
    }

    /// Re-read the token file. Returns the new token only if it differs from
    /// `expired_token`, meaning the file has been rotated since.
    pub async fn default_token_expired_callback(&self, expired_token: &str) -> Option<String> {
        let Some(path) = self.token_file.as_deref() else {
            warn!("no token file configured; cannot replace expired token");
            return None;
        };

        match self.token_loader.load(path).await {
            Ok(auth) if auth.client_token != expired_token => Some(auth.client_token),
            Ok(_) => {
                info!("token file has not been rotated yet");
                None
            }
            Err(e) => {
                error!(error = %e, "failed to reload token file");
                None
            }
        }
    }

    /// Obtain a fresh token from the runtime token source.
    pub async fn runtime_token_expired_callback(&self, _expired_token: &str) -> Option<String> {
        let Some(source) = self.runtime_token_source.as_ref() else {
            warn!("no runtime token source configured; cannot replace expired token");
            return None;
        };

        match source.get_token(&self.service_key).await {
            Ok(auth) => Some(auth.client_token),
            Err(e) => {
                error!(error = %e, "failed to obtain runtime token");
                None
            }
        }
    }

    /// The expired-token callback matching this provider's token mode.
    pub async fn token_expired_callback(&self, expired_token: &str) -> Option<String> {
        if self.is_runtime_token_mode() {
            self.runtime_token_expired_callback(expired_token).await
        } else {
            self.default_token_expired_callback(expired_token).await
        }
    }

    /// Fetch a fresh token from whichever source this provider uses.
    pub(super) async fn load_token(&self) -> Result<String, SecretError> {
        let auth = match (&self.runtime_token_source, self.token_file.as_deref()) {
            (Some(source), _) => source.get_token(&self.service_key).await,
            (None, Some(path)) => self.token_loader.load(path).await,
            (None, None) => {
                return Err(SecretError::ServerError(
                    "no token file or runtime token source configured".into(),
                ))
            }
        };
        auth.map(|a| a.client_token)
            .map_err(|e| SecretError::ServerError(format!("failed to reload token: {e}")))
    }

    async fn fetch_secret(
        &self,
        secret_name: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, String>, SecretError> {
        if let Some(hit) = self.cache.get(secret_name, keys).await {
            return Ok(hit);
        }

        let client = self.require_client()?;
        let generation = self.cache.generation().await;
        let owned: Vec<String> = keys.iter().map(|k| (*k).to_owned()).collect();
        let secrets = self
            .with_auth_retry(&client, || client.get_secrets(secret_name, &owned))
            .await?;

        if self.cache.update(secret_name, &secrets, generation).await {
            debug!(secret_name, "secret fetched from store");
        } else {
            debug!(secret_name, "secrets changed during fetch; result not cached");
        }
        Ok(secrets)
    }
}

#[async_trait]
impl SecretProvider for SecureProvider {
    async fn retrieve_secret(
        &self,
        secret_name: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, String>, SecretError> {
        self.metrics.secret_requested();
        let started = Instant::now();
        let result = self.fetch_secret(secret_name, keys).await;
        self.metrics.record_retrieve(started.elapsed());
        result
    }

    async fn save_secret(
        &self,
        secret_name: &str,
        data: HashMap<String, String>,
    ) -> Result<(), SecretError> {
        self.metrics.secret_stored();
        let client = self.require_client()?;
        self.with_auth_retry(&client, || client.store_secrets(secret_name, &data))
            .await?;

        // Invalidate before callbacks so they observe the new values.
        self.cache.clear().await;
        self.secret_updated_at_secret_name(secret_name);
        info!(secret_name, "secret stored");
        Ok(())
    }

    async fn list_secret_names(&self) -> Result<Vec<String>, SecretError> {
        let client = self.require_client()?;
        self.with_auth_retry(&client, || client.get_secret_names())
            .await
    }

    fn secrets_last_updated(&self) -> SystemTime {
        self.callbacks.last_updated()
    }

    fn register_secret_updated_callback(
        &self,
        secret_name: &str,
        callback: SecretUpdatedCallback,
    ) -> Result<(), SecretError> {
        self.callbacks.register(secret_name, callback)
    }

    fn deregister_secret_updated_callback(&self, secret_name: &str) {
        self.callbacks.deregister(secret_name);
    }

    fn secret_updated_at_secret_name(&self, secret_name: &str) {
        self.callbacks.dispatch(secret_name);
    }

    async fn get_self_jwt(&self) -> Result<String, SecretError> {
        let client = self.require_client()?;
        client
            .get_self_jwt(self.jwt_identity())
            .await
            .map_err(SecretError::from)
    }

    async fn is_jwt_valid(&self, jwt: &str) -> Result<bool, SecretError> {
        let client = self.require_client()?;
        client.is_jwt_valid(jwt).await.map_err(SecretError::from)
    }

    fn is_zero_trust_enabled(&self) -> bool {
        self.zero_trust.load(Ordering::SeqCst)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
