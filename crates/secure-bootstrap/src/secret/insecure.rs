//! [`InsecureProvider`]: secrets from configuration, no secret store.
//!
//! Used when security is disabled. Reads are lock-free; the whole map is
//! swapped when the configured secrets change.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::SystemTime,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use common::{protocol::SecretsFile, SecretError};
use tracing::info;

use super::{
    callbacks::{CallbackRegistry, SecretUpdatedCallback},
    metrics::{MetricsSnapshot, ProviderMetrics},
    SecretProvider,
};

type Groups = HashMap<String, HashMap<String, String>>;

pub struct InsecureProvider {
    secrets: ArcSwap<Groups>,
    callbacks: CallbackRegistry,
    metrics: ProviderMetrics,
}

impl InsecureProvider {
    pub fn new(service_key: &str, secrets: Groups) -> Self {
        Self {
            secrets: ArcSwap::new(Arc::new(secrets)),
            callbacks: CallbackRegistry::new(),
            metrics: ProviderMetrics::new(service_key),
        }
    }

    /// Atomically swap in `secrets` and run update callbacks for every group
    /// that was added, changed or removed. Returns those names, sorted.
    pub fn replace_secrets(&self, secrets: Groups) -> Vec<String> {
        let previous = self.secrets.swap(Arc::new(secrets));
        let current = self.secrets.load();

        let changed: Vec<String> = previous
            .keys()
            .chain(current.keys())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|name| previous.get(*name) != current.get(*name))
            .cloned()
            .collect();

        for name in &changed {
            self.callbacks.dispatch(name);
        }
        if !changed.is_empty() {
            info!(count = changed.len(), "insecure secrets replaced");
        }
        changed
    }
}

pub(crate) fn groups_from_file(file: &SecretsFile) -> Groups {
    file.secrets
        .iter()
        .map(|s| (s.secret_name.clone(), s.data_map()))
        .collect()
}

#[async_trait]
impl SecretProvider for InsecureProvider {
    async fn retrieve_secret(
        &self,
        secret_name: &str,
        keys: &[&str],
    ) -> Result<HashMap<String, String>, SecretError> {
        self.metrics.secret_requested();
        let secrets = self.secrets.load();
        let group = secrets
            .get(secret_name)
            .ok_or_else(|| SecretError::SecretNotFound(secret_name.to_owned()))?;

        if keys.is_empty() {
            return Ok(group.clone());
        }

        let missing: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|k| !group.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(SecretError::SecretNotFound(format!(
                "{secret_name} (missing keys: {})",
                missing.join(", ")
            )));
        }

        Ok(keys
            .iter()
            .filter_map(|k| group.get(*k).map(|v| ((*k).to_owned(), v.clone())))
            .collect())
    }

    async fn save_secret(
        &self,
        secret_name: &str,
        _data: HashMap<String, String>,
    ) -> Result<(), SecretError> {
        self.metrics.secret_stored();
        Err(SecretError::ContractInvalid(format!(
            "cannot store secret {secret_name}: storing secrets requires security to be enabled"
        )))
    }

    async fn list_secret_names(&self) -> Result<Vec<String>, SecretError> {
        let mut names: Vec<String> = self.secrets.load().keys().cloned().collect();
        names.sort();
        Ok(names)
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
        Ok(String::new())
    }

    async fn is_jwt_valid(&self, _jwt: &str) -> Result<bool, SecretError> {
        Ok(true)
    }

    fn is_zero_trust_enabled(&self) -> bool {
        false
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::WILDCARD_SECRET_NAME;
    use std::sync::Mutex;

    fn group(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn provider() -> InsecureProvider {
        let mut groups = Groups::new();
        groups.insert("db".into(), group(&[("username", "u"), ("password", "p")]));
        InsecureProvider::new("core-data", groups)
    }

    #[tokio::test]
    async fn retrieves_requested_keys() {
        let p = provider();
        let got = p.retrieve_secret("db", &["username"]).await.unwrap();
        assert_eq!(got, group(&[("username", "u")]));
        assert_eq!(p.retrieve_secret("db", &[]).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_group_or_key_is_not_found() {
        let p = provider();
        assert!(matches!(
            p.retrieve_secret("mqtt", &[]).await,
            Err(SecretError::SecretNotFound(_))
        ));
        assert!(matches!(
            p.retrieve_secret("db", &["username", "token"]).await,
            Err(SecretError::SecretNotFound(msg)) if msg.contains("token")
        ));
        assert!(!p.has_secret("mqtt").await.unwrap());
        assert!(p.has_secret("db").await.unwrap());
    }

    #[tokio::test]
    async fn save_is_rejected() {
        let err = provider()
            .save_secret("db", group(&[("k", "v")]))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::ContractInvalid(_)));
    }

    #[tokio::test]
    async fn jwt_operations_are_permissive() {
        let p = provider();
        assert_eq!(p.get_self_jwt().await.unwrap(), "");
        assert!(p.is_jwt_valid("anything").await.unwrap());
        assert!(!p.is_zero_trust_enabled());
    }

    #[tokio::test]
    async fn replace_fires_callbacks_for_changed_groups_only() {
        let p = provider();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        p.register_secret_updated_callback(
            WILDCARD_SECRET_NAME,
            Arc::new(move |name: &str| sink.lock().unwrap().push(name.to_owned())),
        )
        .unwrap();

        let mut next = Groups::new();
        next.insert("db".into(), group(&[("username", "u"), ("password", "p")]));
        next.insert("mqtt".into(), group(&[("username", "m")]));
        assert_eq!(p.replace_secrets(next.clone()), vec!["mqtt".to_string()]);

        next.remove("db");
        assert_eq!(p.replace_secrets(next), vec!["db".to_string()]);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["mqtt".to_string(), "db".to_string()]
        );
        assert_eq!(p.list_secret_names().await.unwrap(), vec!["mqtt".to_string()]);
    }

    #[test]
    fn builds_from_seed_file() {
        let file: SecretsFile = serde_json::from_str(
            r#"{"secrets":[{"secretName":"db","imported":true,"secretData":[{"key":"password","value":"p"}]}]}"#,
        )
        .unwrap();
        let p = InsecureProvider::new("core-data", groups_from_file(&file));
        assert_eq!(p.secrets.load().len(), 1);
    }
}
