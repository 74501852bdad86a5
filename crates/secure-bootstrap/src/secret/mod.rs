//! Secret access for the rest of the service.
//!
//! # Responsibilities
//!
//! - [`SecureProvider`] fronts the backing secret store: read-through cache,
//!   one reload-and-retry on a rejected token, update callbacks, self-identity
//!   JWTs and the zero-trust transport state.
//! - [`InsecureProvider`] serves a fixed, replaceable secret map when security
//!   is disabled.
//!
//! # Module invariants
//!
//! - Secret values and tokens never appear in log fields or error messages.
//! - Update callbacks run synchronously on the caller's task and must not block.
//! - At most one callback per exact secret name; [`WILDCARD_SECRET_NAME`] is a
//!   name like any other for registration purposes.

pub mod cache;
pub mod callbacks;
pub mod insecure;
pub mod metrics;
pub mod provider;
pub mod reload;
pub mod token;
pub mod transport;

pub use cache::SecretsCache;
pub use callbacks::{CallbackRegistry, SecretUpdatedCallback, WILDCARD_SECRET_NAME};
pub use insecure::InsecureProvider;
pub use metrics::{MetricsSnapshot, ProviderMetrics};
pub use provider::SecureProvider;
pub use token::{AuthTokenLoader, FileTokenLoader, HttpRuntimeTokenSource, RuntimeTokenSource};
pub use transport::{FallbackDialer, TcpDialer};

use std::{collections::HashMap, time::SystemTime};

use async_trait::async_trait;
use common::SecretError;

/// Object-safe façade implemented by both providers.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch `keys` of `secret_name`, or the whole group when `keys` is empty.
    async fn retrieve_secret(
        &self,
        secret_name: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, String>, SecretError>;

    /// Write `data` under `secret_name`.
    async fn save_secret(
        &self,
        secret_name: &str,
        data: HashMap<String, String>,
    ) -> Result<(), SecretError>;

    /// `Ok(false)` when the group does not exist; other failures propagate.
    async fn has_secret(&self, secret_name: &str) -> Result<bool, SecretError> {
        match self.retrieve_secret(secret_name, &[]).await {
            Ok(_) => Ok(true),
            Err(SecretError::SecretNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_secret_names(&self) -> Result<Vec<String>, SecretError>;

    /// When secrets were last written or reported as updated.
    fn secrets_last_updated(&self) -> SystemTime;

    fn register_secret_updated_callback(
        &self,
        secret_name: &str,
        callback: SecretUpdatedCallback,
    ) -> Result<(), SecretError>;

    fn deregister_secret_updated_callback(&self, secret_name: &str);

    /// Record an update of `secret_name` and run its callback (or the wildcard one).
    fn secret_updated_at_secret_name(&self, secret_name: &str);

    /// Identity JWT for this service, minted by the secret store.
    async fn get_self_jwt(&self) -> Result<String, SecretError>;

    /// Ask the source of truth whether `jwt` is valid. Never cached.
    async fn is_jwt_valid(&self, jwt: &str) -> Result<bool, SecretError>;

    fn is_zero_trust_enabled(&self) -> bool;

    fn metrics(&self) -> MetricsSnapshot;
}
