//! Configuration loading and validation for the service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::store::SecretStoreConfig;

/// Validated service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Identity of this service in the secret store (e.g. `"core-data"`). **Required.**
    pub service_key: String,

    /// Port the HTTP API listens on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP endpoint. When unset, only JSON logs are emitted.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Run with the secure provider. `false` selects the insecure provider.
    #[serde(default = "default_true")]
    pub security_enabled: bool,

    /// Skip JWT verification on protected routes.
    #[serde(default)]
    pub disable_jwt_validation: bool,

    /// Let every `app-*` service share the common app-service identity.
    #[serde(default)]
    pub use_common_app_service_secret_key: bool,

    /// Enable the zero-trust transport flag on the provider.
    #[serde(default)]
    pub zero_trust_enabled: bool,

    #[serde(default = "default_secret_store_protocol")]
    pub secret_store_protocol: String,

    #[serde(default = "default_secret_store_host")]
    pub secret_store_host: String,

    #[serde(default = "default_secret_store_port")]
    pub secret_store_port: u16,

    /// KV mount of the secret store.
    #[serde(default = "default_secret_store_mount")]
    pub secret_store_mount: String,

    /// Path prefix under the mount; the service key is appended.
    #[serde(default = "default_secret_store_base_path")]
    pub secret_store_base_path: String,

    /// Token file written by the secret-store setup service.
    /// **Required** unless the runtime token provider is enabled.
    #[serde(default)]
    pub secret_store_token_file: Option<String>,

    /// Seed secrets imported once at bring-up.
    #[serde(default)]
    pub secrets_file: Option<String>,

    /// Keep imported secret values in the seed file.
    #[serde(default)]
    pub disable_scrub_secrets_file: bool,

    /// Secrets served by the insecure provider (seed-file format).
    #[serde(default)]
    pub insecure_secrets_file: Option<String>,

    /// How often the insecure secrets file is re-read.
    #[serde(default = "default_insecure_secrets_refresh")]
    pub insecure_secrets_refresh_secs: u64,

    /// Obtain the store token from the runtime token provider instead of a file.
    #[serde(default)]
    pub runtime_token_provider_enabled: bool,

    #[serde(default)]
    pub runtime_token_provider_url: Option<String>,

    /// Base URL of the secret-store setup service (token regeneration).
    #[serde(default = "default_secretstore_setup_url")]
    pub secretstore_setup_url: String,

    /// Base URL of the verification-key lookup service.
    #[serde(default = "default_key_lookup_url")]
    pub key_lookup_url: String,

    /// Total time allowed for bring-up.
    #[serde(default = "default_startup_duration")]
    pub startup_duration_secs: u64,

    /// Sleep between bring-up attempts.
    #[serde(default = "default_startup_interval")]
    pub startup_interval_secs: u64,

    /// How often the store token is renewed.
    #[serde(default = "default_token_renew_interval")]
    pub token_renew_interval_secs: u64,

    /// Issuer claim of JWTs minted by the secret store itself.
    #[serde(default = "default_self_issued_jwt_issuer")]
    pub self_issued_jwt_issuer: String,
}

fn default_http_port() -> u16 {
    59880
}
fn default_log_level() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}
fn default_secret_store_protocol() -> String {
    "http".into()
}
fn default_secret_store_host() -> String {
    "localhost".into()
}
fn default_secret_store_port() -> u16 {
    8200
}
fn default_secret_store_mount() -> String {
    "secret".into()
}
fn default_secret_store_base_path() -> String {
    "edgex".into()
}
fn default_secretstore_setup_url() -> String {
    "http://localhost:59843".into()
}
fn default_key_lookup_url() -> String {
    "http://localhost:59842".into()
}
fn default_startup_duration() -> u64 {
    60
}
fn default_startup_interval() -> u64 {
    1
}
fn default_token_renew_interval() -> u64 {
    300
}
fn default_insecure_secrets_refresh() -> u64 {
    30
}
fn default_self_issued_jwt_issuer() -> String {
    "/v1/identity/oidc".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.service_key, "SERVICE_KEY")?;

        if self.startup_duration_secs == 0 {
            anyhow::bail!("STARTUP_DURATION_SECS must be > 0");
        }
        if self.startup_interval_secs == 0 {
            anyhow::bail!("STARTUP_INTERVAL_SECS must be > 0");
        }
        if self.token_renew_interval_secs == 0 {
            anyhow::bail!("TOKEN_RENEW_INTERVAL_SECS must be > 0");
        }
        if self.insecure_secrets_refresh_secs == 0 {
            anyhow::bail!("INSECURE_SECRETS_REFRESH_SECS must be > 0");
        }

        if !self.security_enabled {
            return Ok(());
        }

        ensure_non_empty(&self.secret_store_host, "SECRET_STORE_HOST")?;
        ensure_non_empty(&self.secret_store_mount, "SECRET_STORE_MOUNT")?;
        ensure_non_empty(&self.self_issued_jwt_issuer, "SELF_ISSUED_JWT_ISSUER")?;
        if self.runtime_token_provider_enabled {
            ensure_non_empty(
                self.runtime_token_provider_url.as_deref().unwrap_or_default(),
                "RUNTIME_TOKEN_PROVIDER_URL",
            )?;
        } else {
            ensure_non_empty(
                self.secret_store_token_file.as_deref().unwrap_or_default(),
                "SECRET_STORE_TOKEN_FILE",
            )?;
        }
        Ok(())
    }

    /// Connection settings for the backing store, carrying `token`.
    pub fn secret_store(&self, token: String) -> SecretStoreConfig {
        SecretStoreConfig {
            protocol: self.secret_store_protocol.clone(),
            host: self.secret_store_host.clone(),
            port: self.secret_store_port,
            mount: self.secret_store_mount.clone(),
            base_path: format!(
                "{}/{}",
                self.secret_store_base_path.trim_matches('/'),
                self.service_key
            ),
            token,
        }
    }

    pub fn startup_duration(&self) -> Duration {
        Duration::from_secs(self.startup_duration_secs)
    }

    pub fn startup_interval(&self) -> Duration {
        Duration::from_secs(self.startup_interval_secs)
    }

    pub fn token_renew_interval(&self) -> Duration {
        Duration::from_secs(self.token_renew_interval_secs)
    }

    pub fn insecure_secrets_refresh(&self) -> Duration {
        Duration::from_secs(self.insecure_secrets_refresh_secs)
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        service_key: "core-data".into(),
        http_port: default_http_port(),
        log_level: default_log_level(),
        otel_exporter_otlp_endpoint: None,
        security_enabled: true,
        disable_jwt_validation: false,
        use_common_app_service_secret_key: false,
        zero_trust_enabled: false,
        secret_store_protocol: default_secret_store_protocol(),
        secret_store_host: default_secret_store_host(),
        secret_store_port: default_secret_store_port(),
        secret_store_mount: default_secret_store_mount(),
        secret_store_base_path: default_secret_store_base_path(),
        secret_store_token_file: Some("/tmp/secrets/core-data/secrets-token.json".into()),
        secrets_file: None,
        disable_scrub_secrets_file: false,
        insecure_secrets_file: None,
        insecure_secrets_refresh_secs: default_insecure_secrets_refresh(),
        runtime_token_provider_enabled: false,
        runtime_token_provider_url: None,
        secretstore_setup_url: default_secretstore_setup_url(),
        key_lookup_url: default_key_lookup_url(),
        startup_duration_secs: default_startup_duration(),
        startup_interval_secs: default_startup_interval(),
        token_renew_interval_secs: default_token_renew_interval(),
        self_issued_jwt_issuer: default_self_issued_jwt_issuer(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_http_port(), 59880);
        assert_eq!(default_secret_store_port(), 8200);
        assert_eq!(default_startup_duration(), 60);
        assert_eq!(default_startup_interval(), 1);
        assert_eq!(default_self_issued_jwt_issuer(), "/v1/identity/oidc");
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_accepts_test_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_service_key() {
        let cfg = Config {
            service_key: " ".into(),
            ..test_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_token_file_in_file_mode() {
        let cfg = Config {
            secret_store_token_file: None,
            ..test_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_runtime_url_in_runtime_mode() {
        let cfg = Config {
            secret_store_token_file: None,
            runtime_token_provider_enabled: true,
            ..test_config()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            runtime_token_provider_url: Some("https://localhost:59841/sign".into()),
            ..cfg
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn insecure_mode_skips_store_checks() {
        let cfg = Config {
            security_enabled: false,
            secret_store_token_file: None,
            ..test_config()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let cfg = Config {
            startup_interval_secs: 0,
            ..test_config()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn secret_store_path_includes_service_key() {
        let store = test_config().secret_store("token".into());
        assert_eq!(store.base_path, "edgex/core-data");
        assert_eq!(store.port, 8200);
    }
}
