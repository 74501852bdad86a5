//! `secure-bootstrap`: service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (OTEL + tracing).
//! 3. Build the HTTP client and the bring-up collaborators.
//! 4. Install the shutdown signal handler.
//! 5. Bring up the secret provider (secure or insecure).
//! 6. Spawn background tasks: token renewal or insecure secrets refresh.
//! 7. Build the JWT verifier when validation is enabled.
//! 8. Build the Axum router and serve until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use secure_bootstrap::{
    bootstrap::{self, BringUpDeps, Provisioned},
    config::Config,
    jwt::{HttpKeyLookup, JwtVerifier, VerificationKeyResolver},
    secret::{FileTokenLoader, HttpRuntimeTokenSource, RuntimeTokenSource, TcpDialer},
    server::{self, state::AppState},
    store::{HttpSecretStoreConnector, HttpSecretStoreSetupClient},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        service_key = %cfg.service_key,
        security_enabled = cfg.security_enabled,
        http_port = cfg.http_port,
        "secure-bootstrap starting"
    );

    // -----------------------------------------------------------------------
    // 3. HTTP client and collaborators
    // -----------------------------------------------------------------------
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let runtime_token_source: Option<Arc<dyn RuntimeTokenSource>> =
        match (cfg.runtime_token_provider_enabled, &cfg.runtime_token_provider_url) {
            (true, Some(url)) => Some(Arc::new(HttpRuntimeTokenSource::new(
                url.clone(),
                http.clone(),
            ))),
            _ => None,
        };

    let deps = BringUpDeps {
        connector: Arc::new(HttpSecretStoreConnector::new(http.clone())),
        setup_client: Arc::new(HttpSecretStoreSetupClient::new(
            cfg.secretstore_setup_url.clone(),
            http.clone(),
        )),
        token_loader: Arc::new(FileTokenLoader),
        runtime_token_source,
    };

    // -----------------------------------------------------------------------
    // 4. Shutdown signal
    // -----------------------------------------------------------------------
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    // -----------------------------------------------------------------------
    // 5. Secret provider bring-up
    // -----------------------------------------------------------------------
    let provisioned = bootstrap::bring_up(&cfg, &deps, &cancel)
        .await
        .context("secret provider bring-up failed")?;

    if let Provisioned::Secure(provider) = &provisioned {
        if cfg.zero_trust_enabled {
            provider.enable_zero_trust();
            if !provider.set_http_transport(http.clone()) {
                warn!("zero-trust HTTP transport was already configured");
            }
            if !provider.set_fallback_dialer(Arc::new(TcpDialer)) {
                warn!("zero-trust fallback dialer was already configured");
            }
        }
    }

    // -----------------------------------------------------------------------
    // 6. Background tasks
    // -----------------------------------------------------------------------
    let _background = match &provisioned {
        Provisioned::Secure(provider) => Some(bootstrap::token_renewal_task(
            Arc::clone(provider),
            cfg.token_renew_interval(),
            cancel.clone(),
        )),
        Provisioned::Insecure(provider) => cfg.insecure_secrets_file.as_ref().map(|path| {
            bootstrap::insecure_refresh_task(
                Arc::clone(provider),
                path.clone(),
                cfg.insecure_secrets_refresh(),
                cancel.clone(),
            )
        }),
    };

    // -----------------------------------------------------------------------
    // 7. JWT verifier
    // -----------------------------------------------------------------------
    let provider = provisioned.provider();
    let verifier = if cfg.security_enabled && !cfg.disable_jwt_validation {
        let lookup = HttpKeyLookup::new(cfg.key_lookup_url.clone(), http.clone(), provider.clone());
        let resolver = VerificationKeyResolver::new(Arc::new(lookup));
        Some(Arc::new(JwtVerifier::new(
            provider.clone(),
            resolver,
            cfg.self_issued_jwt_issuer.clone(),
        )))
    } else {
        info!("inbound JWT validation disabled");
        None
    };

    // -----------------------------------------------------------------------
    // 8. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(provider, verifier, cfg.service_key.clone(), cfg.security_enabled);
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.http_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await?;

    info!("secure-bootstrap stopped");
    Ok(())
}
