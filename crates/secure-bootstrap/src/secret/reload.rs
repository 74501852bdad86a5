//! Reload-and-retry on a rejected store token.
//!
//! A store call that fails with [`SecretStoreError::AuthRejected`] gets one
//! more attempt after a fresh token has been pushed into the client. Never
//! more than one: a second rejection is returned to the caller.

use std::{future::Future, sync::Arc};

use common::SecretError;
use tracing::{error, info};

use super::provider::SecureProvider;
use crate::store::{SecretStoreClient, SecretStoreError};

impl SecureProvider {
    /// Handle `err` from a store call.
    ///
    /// - `Ok(false)`: `err` is not an auth rejection; the caller returns it unchanged.
    /// - `Ok(true)`: a new token is in place; the caller retries once.
    /// - `Err(_)`: the reload itself failed.
    pub async fn reload_token_on_auth_error(
        &self,
        client: &Arc<dyn SecretStoreClient>,
        err: &SecretStoreError,
    ) -> Result<bool, SecretError> {
        if !err.is_auth_rejected() {
            return Ok(false);
        }

        info!(error = %err, "secret store rejected token; reloading");
        let token = self.load_token().await.inspect_err(|e| {
            error!(error = %e, "token reload failed");
        })?;

        client.set_auth_token(&token).map_err(|e| {
            error!(error = %e, "failed to apply reloaded token");
            SecretError::from(e)
        })?;
        self.record_token(token);

        Ok(true)
    }

    /// Replace a token the store no longer accepts, using the expired-token
    /// callback for this provider's mode.
    ///
    /// Holds the reload lock, so it never interleaves with a reload-and-retry.
    /// `Ok(false)` means no replacement is available yet.
    pub(crate) async fn replace_expired_token(
        &self,
        client: &Arc<dyn SecretStoreClient>,
    ) -> Result<bool, SecretError> {
        let _guard = self.reload_lock.lock().await;
        let expired = self.current_token();
        let Some(token) = self.token_expired_callback(&expired).await else {
            return Ok(false);
        };

        client.set_auth_token(&token).map_err(|e| {
            error!(error = %e, "replacement token rejected by client");
            SecretError::from(e)
        })?;
        self.record_token(token);
        info!("expired secret store token replaced");
        Ok(true)
    }

    /// Run `op`, and run it once more if the first attempt was rejected for
    /// auth and the token reload succeeded. Reloads are serialised per provider.
    pub(crate) async fn with_auth_retry<T, F, Fut>(
        &self,
        client: &Arc<dyn SecretStoreClient>,
        mut op: F,
    ) -> Result<T, SecretError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SecretStoreError>>,
    {
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };

        let _guard = self.reload_lock.lock().await;
        if self.reload_token_on_auth_error(client, &err).await? {
            op().await.map_err(SecretError::from)
        } else {
            Err(err.into())
        }
    }
}
