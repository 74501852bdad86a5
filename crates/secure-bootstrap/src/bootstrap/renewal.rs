//! Background tasks that keep the provider usable after bring-up.

use std::{sync::Arc, time::Duration};

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::seed;
use crate::secret::{insecure::groups_from_file, InsecureProvider, SecureProvider};

/// Result of one renewal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The store extended the current token.
    Renewed,
    /// The token had expired and a replacement was pushed into the client.
    Replaced,
    /// The token has expired and no replacement is available yet.
    Pending,
    Failed,
}

/// Renew the store token once, replacing it through the provider's
/// token-expired callback if the store rejects it.
pub async fn renew_once(provider: &SecureProvider) -> RenewalOutcome {
    let Some(client) = provider.client() else {
        warn!("no secret store client attached; skipping token renewal");
        return RenewalOutcome::Failed;
    };

    match client.renew_token().await {
        Ok(()) => {
            debug!("secret store token renewed");
            RenewalOutcome::Renewed
        }
        Err(e) if e.is_auth_rejected() => match provider.replace_expired_token(&client).await {
            Ok(true) => RenewalOutcome::Replaced,
            Ok(false) => {
                warn!("secret store token expired; no replacement available yet");
                RenewalOutcome::Pending
            }
            Err(_) => RenewalOutcome::Failed,
        },
        Err(e) => {
            warn!(error = %e, "secret store token renewal failed");
            RenewalOutcome::Failed
        }
    }
}

/// Spawn a task renewing the store token every `interval` until `cancel` fires.
pub fn token_renewal_task(
    provider: Arc<SecureProvider>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; the token was just validated.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    renew_once(&provider).await;
                }
            }
        }
        debug!("token renewal task stopped");
    })
}

/// Spawn a task re-reading the insecure secrets file every `interval` and
/// swapping in its contents, which fires callbacks for changed groups.
pub fn insecure_refresh_task(
    provider: Arc<InsecureProvider>,
    path: String,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => match seed::read_secrets_file(&path).await {
                    Ok(file) => {
                        provider.replace_secrets(groups_from_file(&file));
                    }
                    Err(e) => warn!(error = %e, "insecure secrets refresh failed; keeping previous secrets"),
                },
            }
        }
        debug!("insecure secrets refresh task stopped");
    })
}
