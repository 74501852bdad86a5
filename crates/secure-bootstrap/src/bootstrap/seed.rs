//! Seed secrets file: imported into the store once, then scrubbed.

use common::protocol::SecretsFile;
use thiserror::Error;
use tracing::{error, info};

use crate::secret::SecretProvider;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read secrets file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse secrets file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("failed to write secrets file {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("failed to import seed secrets: {}", failed.join(", "))]
    Import { imported: usize, failed: Vec<String> },
}

pub async fn read_secrets_file(path: &str) -> Result<SecretsFile, SeedError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SeedError::Read {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
    serde_json::from_str(&raw).map_err(|e| SeedError::Parse {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

async fn write_secrets_file(path: &str, file: &SecretsFile) -> Result<(), SeedError> {
    let write_err = |reason: String| SeedError::Write {
        path: path.to_owned(),
        reason,
    };
    let body = serde_json::to_vec_pretty(file).map_err(|e| write_err(e.to_string()))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| write_err(e.to_string()))
}

/// Store every entry of the seed file not yet marked imported.
///
/// Imported entries are flagged and their data cleared. A failed entry is
/// left pending and the remaining entries are still attempted. Unless `scrub`
/// is false the file is rewritten whenever something was imported, so stored
/// entries are not imported again. Returns how many entries were imported, or
/// [`SeedError::Import`] naming every entry that failed.
pub async fn import_seed_secrets(
    provider: &dyn SecretProvider,
    path: &str,
    scrub: bool,
) -> Result<usize, SeedError> {
    let mut file = read_secrets_file(path).await?;
    let mut imported = 0;
    let mut failed = Vec::new();

    for secret in file.secrets.iter_mut().filter(|s| !s.imported) {
        match provider
            .save_secret(&secret.secret_name, secret.data_map())
            .await
        {
            Ok(()) => {
                secret.imported = true;
                secret.secret_data.clear();
                imported += 1;
            }
            Err(e) => {
                error!(secret_name = %secret.secret_name, error = %e, "seed secret import failed");
                failed.push(secret.secret_name.clone());
            }
        }
    }

    if scrub && imported > 0 {
        write_secrets_file(path, &file).await?;
    }

    info!(path, imported, failed = failed.len(), "seed secrets processed");
    if failed.is_empty() {
        Ok(imported)
    } else {
        Err(SeedError::Import { imported, failed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{token::MockAuthTokenLoader, InsecureProvider, SecureProvider};
    use crate::store::{MockSecretStoreClient, SecretStoreError};
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;

    const SEED: &str = r#"{
        "secrets": [
            {"secretName": "db", "imported": false, "secretData": [{"key": "password", "value": "p"}]},
            {"secretName": "mqtt", "imported": true, "secretData": []},
            {"secretName": "redis", "secretData": [{"key": "token", "value": "t"}]}
        ]
    }"#;

    fn seed_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();
        file
    }

    fn provider(store: MockSecretStoreClient) -> SecureProvider {
        let p = SecureProvider::new("core-data", Arc::new(MockAuthTokenLoader::new()));
        p.set_client(Arc::new(store));
        p
    }

    #[tokio::test]
    async fn imports_pending_entries_and_scrubs() {
        let mut store = MockSecretStoreClient::new();
        store
            .expect_store_secrets()
            .withf(|name, _| name != "mqtt")
            .times(2)
            .returning(|_, _| Ok(()));

        let file = seed_file();
        let path = file.path().to_str().unwrap();
        let count = import_seed_secrets(&provider(store), path, true)
            .await
            .unwrap();
        assert_eq!(count, 2);

        let rewritten = read_secrets_file(path).await.unwrap();
        assert!(rewritten.secrets.iter().all(|s| s.imported));
        assert!(rewritten.secrets.iter().all(|s| s.secret_data.is_empty()));
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(!raw.contains("\"p\""));
    }

    #[tokio::test]
    async fn scrub_disabled_leaves_file_untouched() {
        let mut store = MockSecretStoreClient::new();
        store.expect_store_secrets().times(2).returning(|_, _| Ok(()));

        let file = seed_file();
        let path = file.path().to_str().unwrap();
        import_seed_secrets(&provider(store), path, false)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), SEED);
    }

    #[tokio::test]
    async fn failed_entry_does_not_stop_later_imports() {
        const SEED3: &str = r#"{
            "secrets": [
                {"secretName": "db", "secretData": [{"key": "password", "value": "p"}]},
                {"secretName": "redis", "secretData": [{"key": "token", "value": "t"}]},
                {"secretName": "mqtt", "secretData": [{"key": "password", "value": "m"}]}
            ]
        }"#;
        let mut store = MockSecretStoreClient::new();
        store
            .expect_store_secrets()
            .times(3)
            .returning(|name, _| match name {
                "redis" => Err(SecretStoreError::Status {
                    status: 500,
                    context: "write redis".into(),
                }),
                _ => Ok(()),
            });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED3.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap();
        let err = import_seed_secrets(&provider(store), path, true)
            .await
            .unwrap_err();
        match err {
            SeedError::Import { imported, failed } => {
                assert_eq!(imported, 2);
                assert_eq!(failed, vec!["redis".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let rewritten = read_secrets_file(path).await.unwrap();
        let by_name = |n: &str| {
            rewritten
                .secrets
                .iter()
                .find(|s| s.secret_name == n)
                .unwrap()
                .clone()
        };
        assert!(by_name("db").imported && by_name("db").secret_data.is_empty());
        assert!(by_name("mqtt").imported && by_name("mqtt").secret_data.is_empty());
        let redis = by_name("redis");
        assert!(!redis.imported);
        assert_eq!(redis.secret_data.len(), 1);
        let raw = std::fs::read_to_string(path).unwrap();
        assert!(!raw.contains("\"m\""));
    }

    #[tokio::test]
    async fn insecure_provider_rejects_import() {
        let file = seed_file();
        let provider = InsecureProvider::new("core-data", HashMap::new());
        let err = import_seed_secrets(&provider, file.path().to_str().unwrap(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, SeedError::Import { imported: 0, ref failed } if failed.len() == 2));
    }

    #[tokio::test]
    async fn unreadable_or_malformed_files_are_reported() {
        assert!(matches!(
            read_secrets_file("/no/such/secrets.json").await,
            Err(SeedError::Read { .. })
        ));

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        bad.write_all(b"{not json").unwrap();
        assert!(matches!(
            read_secrets_file(bad.path().to_str().unwrap()).await,
            Err(SeedError::Parse { .. })
        ));
    }
}
