//! Vault-compatible HTTP implementation of [`SecretStoreClient`].
//!
//! Secret groups live at `v1/{mount}/{base_path}/{secret_name}`; the token is
//! sent in the `X-Vault-Token` header.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use reqwest::{header::HeaderValue, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{
    url_with_segments, validate_secret_name, SecretStoreClient, SecretStoreConfig,
    SecretStoreConnector, SecretStoreError,
};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Deserialize)]
struct KvReadResponse {
    data: HashMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct KvListResponse {
    data: KvListData,
}

#[derive(Deserialize)]
struct KvListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct OidcTokenResponse {
    data: OidcTokenData,
}

#[derive(Deserialize)]
struct OidcTokenData {
    token: String,
}

#[derive(Deserialize)]
struct IntrospectResponse {
    #[serde(default)]
    active: bool,
}

/// Backing-store client over the Vault HTTP API.
pub struct HttpSecretStoreClient {
    http: reqwest::Client,
    base_url: String,
    mount: String,
    base_path: String,
    token: RwLock<HeaderValue>,
}

impl HttpSecretStoreClient {
    /// Build a client for `config` on top of `http`. Does not contact the store.
    ///
    /// # Errors
    ///
    /// Returns [`SecretStoreError::InvalidToken`] if the token cannot be sent
    /// as a header value.
    pub fn new(config: &SecretStoreConfig, http: reqwest::Client) -> Result<Self, SecretStoreError> {
        Ok(Self {
            http,
            base_url: config.base_url(),
            mount: config.mount.trim_matches('/').to_owned(),
            base_path: config.base_path.trim_matches('/').to_owned(),
            token: RwLock::new(token_header(&config.token)?),
        })
    }

    /// `v1/{mount}/{base_path}` followed by `extra`, each segment escaped.
    fn kv_url(&self, extra: Option<&str>) -> Result<Url, SecretStoreError> {
        let segments: Vec<&str> = std::iter::once("v1")
            .chain(self.mount.split('/'))
            .chain(self.base_path.split('/'))
            .filter(|s| !s.is_empty())
            .chain(extra)
            .collect();
        url_with_segments(&self.base_url, &segments).map_err(SecretStoreError::Transport)
    }

    fn secret_url(&self, secret_name: &str) -> Result<Url, SecretStoreError> {
        validate_secret_name(secret_name)?;
        self.kv_url(Some(secret_name))
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, SecretStoreError> {
        let segments: Vec<&str> = std::iter::once("v1").chain(segments.iter().copied()).collect();
        url_with_segments(&self.base_url, &segments).map_err(SecretStoreError::Transport)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self
            .token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        self.http.request(method, url).header(TOKEN_HEADER, token)
    }

    /// Confirm the current token is accepted by the store.
    pub async fn lookup_self(&self) -> Result<(), SecretStoreError> {
        let req = self.request(Method::GET, self.api_url(&["auth", "token", "lookup-self"])?);
        send(req, "token lookup").await.map(|_| ())
    }
}

#[async_trait]
impl SecretStoreClient for HttpSecretStoreClient {
    async fn get_secrets(
        &self,
        secret_name: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, SecretStoreError> {
        let req = self.request(Method::GET, self.secret_url(secret_name)?);
        let resp = send(req, secret_name).await?;
        let body: KvReadResponse = decode(resp).await?;

        let mut all: HashMap<String, String> = body
            .data
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();

        if keys.is_empty() {
            return Ok(all);
        }

        let missing: Vec<&str> = keys
            .iter()
            .filter(|k| !all.contains_key(k.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(SecretStoreError::NotFound(format!(
                "{secret_name} (missing keys: {})",
                missing.join(", ")
            )));
        }

        Ok(keys
            .iter()
            .filter_map(|k| all.remove_entry(k.as_str()))
            .collect())
    }

    async fn store_secrets(
        &self,
        secret_name: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), SecretStoreError> {
        let req = self
            .request(Method::POST, self.secret_url(secret_name)?)
            .json(data);
        send(req, secret_name).await?;
        debug!(secret_name, "secret written to store");
        Ok(())
    }

    async fn get_secret_names(&self) -> Result<Vec<String>, SecretStoreError> {
        let req = self
            .request(Method::GET, self.kv_url(None)?)
            .query(&[("list", "true")]);
        let resp = match send(req, "secret names").await {
            Ok(resp) => resp,
            // Vault answers 404 for a path with nothing under it.
            Err(SecretStoreError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let body: KvListResponse = decode(resp).await?;
        Ok(body
            .data
            .keys
            .into_iter()
            .map(|k| k.trim_end_matches('/').to_owned())
            .collect())
    }

    fn set_auth_token(&self, token: &str) -> Result<(), SecretStoreError> {
        let value = token_header(token)?;
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
        Ok(())
    }

    async fn get_self_jwt(&self, service_key: &str) -> Result<String, SecretStoreError> {
        let url = self.api_url(&["identity", "oidc", "token", service_key])?;
        let resp = send(self.request(Method::GET, url), "self JWT").await?;
        let body: OidcTokenResponse = decode(resp).await?;
        Ok(body.data.token)
    }

    async fn is_jwt_valid(&self, jwt: &str) -> Result<bool, SecretStoreError> {
        let req = self
            .request(Method::POST, self.api_url(&["identity", "oidc", "introspect"])?)
            .json(&json!({ "token": jwt }));
        let resp = req
            .send()
            .await
            .map_err(|e| SecretStoreError::Transport(e.to_string()))?;
        match resp.status() {
            // Introspection of a bad token is reported as 400 with `active: false`.
            StatusCode::BAD_REQUEST => Ok(false),
            status if status.is_success() => {
                let body: IntrospectResponse = decode(resp).await?;
                Ok(body.active)
            }
            status => Err(classify(status, "JWT introspection")),
        }
    }

    async fn renew_token(&self) -> Result<(), SecretStoreError> {
        let req = self
            .request(Method::POST, self.api_url(&["auth", "token", "renew-self"])?)
            .json(&json!({}));
        send(req, "token renewal").await.map(|_| ())
    }
}

/// Connector producing [`HttpSecretStoreClient`]s that have passed a token lookup.
#[derive(Clone)]
pub struct HttpSecretStoreConnector {
    http: reqwest::Client,
}

impl HttpSecretStoreConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SecretStoreConnector for HttpSecretStoreConnector {
    async fn connect(
        &self,
        config: &SecretStoreConfig,
    ) -> Result<Arc<dyn SecretStoreClient>, SecretStoreError> {
        let client = HttpSecretStoreClient::new(config, self.http.clone())?;
        client.lookup_self().await?;
        Ok(Arc::new(client))
    }
}

fn token_header(token: &str) -> Result<HeaderValue, SecretStoreError> {
    if token.trim().is_empty() {
        return Err(SecretStoreError::InvalidToken("token is empty".into()));
    }
    let mut value = HeaderValue::from_str(token)
        .map_err(|_| SecretStoreError::InvalidToken("token contains invalid characters".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

pub(super) async fn send(req: RequestBuilder, context: &str) -> Result<Response, SecretStoreError> {
    let resp = req
        .send()
        .await
        .map_err(|e| SecretStoreError::Transport(format!("{context}: {e}")))?;
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(classify(status, context))
    }
}

fn classify(status: StatusCode, context: &str) -> SecretStoreError {
    match status {
        StatusCode::FORBIDDEN => SecretStoreError::AuthRejected(format!("{context}: {status}")),
        StatusCode::NOT_FOUND => SecretStoreError::NotFound(context.to_owned()),
        other => SecretStoreError::Status {
            status: other.as_u16(),
            context: context.to_owned(),
        },
    }
}

pub(super) async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, SecretStoreError> {
    resp.json::<T>()
        .await
        .map_err(|e| SecretStoreError::Decode(e.to_string()))
}
