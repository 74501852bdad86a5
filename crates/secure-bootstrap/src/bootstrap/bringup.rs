//! Provider bring-up: connect to the secret store before the deadline.

use std::{collections::HashMap, sync::Arc, time::Duration};

use common::protocol::TokenAuth;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{seed, timer::StartupTimer};
use crate::{
    config::Config,
    secret::{
        insecure::groups_from_file, AuthTokenLoader, InsecureProvider, RuntimeTokenSource,
        SecretProvider, SecureProvider,
    },
    store::{SecretStoreConnector, SecretStoreSetupClient},
};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("secret provider was not ready within {0:?}")]
    Timeout(Duration),

    #[error("bring-up cancelled")]
    Cancelled,

    #[error("invalid bootstrap configuration: {0}")]
    Config(String),
}

/// Collaborators used during bring-up.
#[derive(Clone)]
pub struct BringUpDeps {
    pub connector: Arc<dyn SecretStoreConnector>,
    pub setup_client: Arc<dyn SecretStoreSetupClient>,
    pub token_loader: Arc<dyn AuthTokenLoader>,
    /// Present in runtime-token mode.
    pub runtime_token_source: Option<Arc<dyn RuntimeTokenSource>>,
}

/// The provider the service runs with.
pub enum Provisioned {
    Secure(Arc<SecureProvider>),
    Insecure(Arc<InsecureProvider>),
}

impl Provisioned {
    pub fn provider(&self) -> Arc<dyn SecretProvider> {
        match self {
            Provisioned::Secure(provider) => provider.clone(),
            Provisioned::Insecure(provider) => provider.clone(),
        }
    }
}

/// Build the provider selected by `cfg`.
pub async fn bring_up(
    cfg: &Config,
    deps: &BringUpDeps,
    cancel: &CancellationToken,
) -> Result<Provisioned, BootstrapError> {
    if !cfg.security_enabled {
        return insecure_provider(cfg).await.map(Provisioned::Insecure);
    }

    let timer = StartupTimer::new(cfg.startup_duration(), cfg.startup_interval());
    bring_up_secure_provider(cfg, deps, timer, cancel)
        .await
        .map(Provisioned::Secure)
}

/// Insecure provider seeded from `INSECURE_SECRETS_FILE`, if configured.
pub async fn insecure_provider(cfg: &Config) -> Result<Arc<InsecureProvider>, BootstrapError> {
    let groups = match cfg.insecure_secrets_file.as_deref() {
        Some(path) => {
            let file = seed::read_secrets_file(path)
                .await
                .map_err(|e| BootstrapError::Config(e.to_string()))?;
            groups_from_file(&file)
        }
        None => HashMap::new(),
    };
    warn!(
        groups = groups.len(),
        "security disabled; serving secrets from configuration"
    );
    Ok(Arc::new(InsecureProvider::new(&cfg.service_key, groups)))
}

fn new_secure_provider(cfg: &Config, deps: &BringUpDeps) -> SecureProvider {
    let mut provider = SecureProvider::new(cfg.service_key.clone(), deps.token_loader.clone())
        .with_common_app_service_key(cfg.use_common_app_service_secret_key);
    if let Some(path) = cfg.secret_store_token_file.as_deref() {
        provider = provider.with_token_file(path);
    }
    if let Some(source) = deps.runtime_token_source.clone() {
        provider = provider.with_runtime_token_source(source);
    }
    provider
}

async fn obtain_token(cfg: &Config, deps: &BringUpDeps) -> Result<TokenAuth, String> {
    if let Some(source) = deps.runtime_token_source.as_ref() {
        return source
            .get_token(&cfg.service_key)
            .await
            .map_err(|e| e.to_string());
    }
    let path = cfg
        .secret_store_token_file
        .as_deref()
        .ok_or_else(|| "no token file configured".to_owned())?;
    deps.token_loader.load(path).await.map_err(|e| e.to_string())
}

/// Ask the setup service for a new token file. Authenticates with the self
/// JWT of an unauthenticated provider, which is empty when the store cannot
/// mint one without a token.
async fn regenerate_token(cfg: &Config, deps: &BringUpDeps, rejected: &TokenAuth) {
    let Some(entity_id) = rejected.entity_id.as_deref() else {
        error!("token file has no entity_id; cannot request a new token");
        return;
    };

    let fallback = InsecureProvider::new(&cfg.service_key, HashMap::new());
    let jwt = fallback.get_self_jwt().await.unwrap_or_default();

    match deps.setup_client.regen_token(entity_id, &jwt).await {
        Ok(()) => info!(entity_id, "new secret store token requested"),
        Err(e) => error!(entity_id, error = %e, "token regeneration failed"),
    }
}

async fn pause(timer: &StartupTimer, cancel: &CancellationToken) -> Result<(), BootstrapError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(BootstrapError::Cancelled),
        _ = tokio::time::sleep(timer.retry_delay()) => Ok(()),
    }
}

/// Retry connecting until a client is attached, the timer runs out, or
/// `cancel` fires.
///
/// On success the seed file (if any) is imported; import failures are
/// logged and do not fail bring-up.
pub async fn bring_up_secure_provider(
    cfg: &Config,
    deps: &BringUpDeps,
    timer: StartupTimer,
    cancel: &CancellationToken,
) -> Result<Arc<SecureProvider>, BootstrapError> {
    let provider = Arc::new(new_secure_provider(cfg, deps));

    while timer.has_not_elapsed() {
        if cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }

        let auth = match obtain_token(cfg, deps).await {
            Ok(auth) => auth,
            Err(reason) => {
                warn!(error = %reason, "secret store token unavailable; retrying");
                pause(&timer, cancel).await?;
                continue;
            }
        };

        let store_cfg = cfg.secret_store(auth.client_token.clone());
        match deps.connector.connect(&store_cfg).await {
            Ok(client) => {
                provider.attach_client(client, auth.client_token);
                if let Some(path) = cfg.secrets_file.as_deref() {
                    if let Err(e) =
                        seed::import_seed_secrets(provider.as_ref(), path, !cfg.disable_scrub_secrets_file)
                            .await
                    {
                        error!(error = %e, "seed secrets not fully imported");
                    }
                }
                info!(service_key = %cfg.service_key, "secret provider ready");
                return Ok(provider);
            }
            Err(e) if e.is_auth_rejected() && deps.runtime_token_source.is_none() => {
                warn!(error = %e, "secret store token rejected; requesting a new one");
                regenerate_token(cfg, deps, &auth).await;
                pause(&timer, cancel).await?;
            }
            Err(e) => {
                warn!(error = %e, "could not connect to secret store; retrying");
                pause(&timer, cancel).await?;
            }
        }
    }

    error!("secret provider bring-up timed out");
    Err(BootstrapError::Timeout(timer.duration()))
}
