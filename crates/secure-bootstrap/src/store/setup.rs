//! Client for the secret-store setup service, which can regenerate a
//! service's store token after the one on disk has been rejected.

use async_trait::async_trait;
use tracing::debug;

use super::{http::send, url_with_segments, SecretStoreError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStoreSetupClient: Send + Sync {
    /// Ask the setup service to issue a fresh token for `entity_id`.
    ///
    /// `jwt` authenticates the request; an empty string sends none.
    async fn regen_token(&self, entity_id: &str, jwt: &str) -> Result<(), SecretStoreError>;
}

#[derive(Clone)]
pub struct HttpSecretStoreSetupClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSecretStoreSetupClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SecretStoreSetupClient for HttpSecretStoreSetupClient {
    async fn regen_token(&self, entity_id: &str, jwt: &str) -> Result<(), SecretStoreError> {
        let url = url_with_segments(&self.base_url, &["api", "v3", "token", "entityId", entity_id])
            .map_err(SecretStoreError::Transport)?;

        let mut req = self.http.put(url);
        if !jwt.is_empty() {
            req = req.bearer_auth(jwt);
        }

        send(req, "regenerate token").await?;
        debug!(entity_id, "token regeneration requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn regen_puts_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v3/token/entityId/ent-42"))
            .and(header("authorization", "Bearer header.claims.sig"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSecretStoreSetupClient::new(server.uri(), reqwest::Client::new());
        client.regen_token("ent-42", "header.claims.sig").await.unwrap();
    }

    #[tokio::test]
    async fn regen_without_jwt_sends_no_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v3/token/entityId/ent-42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSecretStoreSetupClient::new(server.uri(), reqwest::Client::new());
        client.regen_token("ent-42", "").await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert!(received[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn regen_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpSecretStoreSetupClient::new(server.uri(), reqwest::Client::new());
        let err = client.regen_token("ent-42", "").await.unwrap_err();
        assert!(matches!(err, SecretStoreError::Status { status: 500, .. }));
    }
}
