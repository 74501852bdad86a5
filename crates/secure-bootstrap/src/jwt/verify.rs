//! [`JwtVerifier`]: authenticates one inbound bearer token.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::SecretError;
use jsonwebtoken::{errors::ErrorKind, DecodingKey, Validation};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{info, warn};

use super::{algorithm::parse_algorithm, keys::VerificationKeyResolver};
use crate::secret::SecretProvider;

#[derive(Deserialize)]
struct UnverifiedHeader {
    alg: String,
}

#[derive(Deserialize)]
struct UnverifiedClaims {
    #[serde(default)]
    iss: Option<String>,
}

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, SecretError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| SecretError::Unauthorized("missing Authorization header".into()))?
        .to_str()
        .map_err(|_| SecretError::Unauthorized("Authorization header is not ASCII".into()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme == "Bearer" && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(SecretError::Unauthorized(
            "Authorization header is not a bearer token".into(),
        )),
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &str) -> Result<T, SecretError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| SecretError::Unauthorized(format!("malformed token {what}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| SecretError::Unauthorized(format!("malformed token {what}")))
}

/// Read header and claims without checking the signature.
fn parse_unverified(token: &str) -> Result<(UnverifiedHeader, UnverifiedClaims), SecretError> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SecretError::Unauthorized(
            "token is not a compact JWS".into(),
        ));
    };
    Ok((decode_segment(header, "header")?, decode_segment(claims, "claims")?))
}

pub struct JwtVerifier {
    provider: Arc<dyn SecretProvider>,
    resolver: VerificationKeyResolver,
    self_issuer: String,
}

impl JwtVerifier {
    /// `self_issuer` is the `iss` of tokens minted by the secret store; those
    /// are checked by the provider instead of by signature.
    pub fn new(
        provider: Arc<dyn SecretProvider>,
        resolver: VerificationKeyResolver,
        self_issuer: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            resolver,
            self_issuer: self_issuer.into(),
        }
    }

    /// Authenticate the bearer token carried in `headers`.
    pub async fn verify_request(&self, headers: &HeaderMap) -> Result<(), SecretError> {
        let token = bearer_token(headers)?;
        self.verify(token).await
    }

    /// Authenticate `token`.
    ///
    /// Verification failures are [`SecretError::Unauthorized`]. A token whose
    /// only problem is expiry is accepted.
    pub async fn verify(&self, token: &str) -> Result<(), SecretError> {
        let (header, claims) = parse_unverified(token)?;
        let issuer = claims
            .iss
            .filter(|iss| !iss.is_empty())
            .ok_or_else(|| SecretError::Unauthorized("token has no issuer".into()))?;

        if issuer == self.self_issuer {
            return if self.provider.is_jwt_valid(token).await? {
                Ok(())
            } else {
                Err(SecretError::Unauthorized(
                    "token rejected by secret store".into(),
                ))
            };
        }

        let key = self
            .resolver
            .get_verification_key(&issuer, &header.alg)
            .await?;
        let algorithm = parse_algorithm(&header.alg)?;

        let mut validation = Validation::new(algorithm);
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_aud = false;

        match check(token, &key, &validation) {
            Err(ErrorKind::ExpiredSignature) => {
                // Accept only if nothing but expiry is wrong.
                validation.validate_exp = false;
                check(token, &key, &validation).map_err(|kind| classify(&issuer, kind))?;
                info!(issuer = %issuer, "token expired but otherwise valid; allowing");
                Ok(())
            }
            other => other.map_err(|kind| classify(&issuer, kind)),
        }
    }
}

fn check(token: &str, key: &DecodingKey, validation: &Validation) -> Result<(), ErrorKind> {
    jsonwebtoken::decode::<serde_json::Value>(token, key, validation)
        .map(|_| ())
        .map_err(|e| e.into_kind())
}

fn classify(issuer: &str, kind: ErrorKind) -> SecretError {
    match kind {
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingAlgorithm
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => {
            warn!(issuer, reason = ?kind, "token failed verification");
            SecretError::Unauthorized("token failed verification".into())
        }
        other => SecretError::ServerError(format!("token verification error: {other:?}")),
    }
}
