//! JWT signing algorithms and how their verification keys are decoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::SecretError;
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::debug;

const PUBLIC_KEY_PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";

/// Key format shared by a group of algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmFamily {
    /// HS256/384/512: shared secret.
    Hmac,
    /// Ed25519 public key in a `PUBLIC KEY` PEM block.
    EdDsa,
    /// RS* and PS*: RSA public key PEM.
    Rsa,
    /// ES256/384: EC public key PEM.
    Ecdsa,
}

/// Map a JWT header `alg` to a supported [`Algorithm`].
///
/// # Errors
///
/// [`SecretError::ContractInvalid`] for anything outside the supported set,
/// including `none`.
pub fn parse_algorithm(alg: &str) -> Result<Algorithm, SecretError> {
    let algorithm = match alg {
        "HS256" => Algorithm::HS256,
        "HS384" => Algorithm::HS384,
        "HS512" => Algorithm::HS512,
        "RS256" => Algorithm::RS256,
        "RS384" => Algorithm::RS384,
        "RS512" => Algorithm::RS512,
        "PS256" => Algorithm::PS256,
        "PS384" => Algorithm::PS384,
        "PS512" => Algorithm::PS512,
        "ES256" => Algorithm::ES256,
        "ES384" => Algorithm::ES384,
        "EdDSA" => Algorithm::EdDSA,
        other => {
            return Err(SecretError::ContractInvalid(format!(
                "unsupported JWT algorithm {other:?}"
            )))
        }
    };
    Ok(algorithm)
}

impl AlgorithmFamily {
    pub fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => AlgorithmFamily::Hmac,
            Algorithm::EdDSA => AlgorithmFamily::EdDsa,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => AlgorithmFamily::Rsa,
            Algorithm::ES256 | Algorithm::ES384 => AlgorithmFamily::Ecdsa,
        }
    }

    /// Decode key material returned by the key lookup service.
    ///
    /// # Errors
    ///
    /// [`SecretError::ServerError`] when PEM material is malformed or of the
    /// wrong type. HMAC material never fails: non-base64 input is used as raw
    /// bytes.
    pub fn decode_key(self, material: &str) -> Result<DecodingKey, SecretError> {
        match self {
            AlgorithmFamily::Hmac => Ok(match STANDARD.decode(material.trim()) {
                Ok(secret) => DecodingKey::from_secret(&secret),
                Err(_) => {
                    debug!("HMAC key is not base64; using raw bytes");
                    DecodingKey::from_secret(material.as_bytes())
                }
            }),
            AlgorithmFamily::EdDsa => {
                if !material.trim_start().starts_with(PUBLIC_KEY_PEM_HEADER) {
                    return Err(SecretError::ServerError(
                        "EdDSA verification key is not a PUBLIC KEY PEM block".into(),
                    ));
                }
                DecodingKey::from_ed_pem(material.as_bytes()).map_err(|e| pem_error("EdDSA", e))
            }
            AlgorithmFamily::Rsa => {
                DecodingKey::from_rsa_pem(material.as_bytes()).map_err(|e| pem_error("RSA", e))
            }
            AlgorithmFamily::Ecdsa => {
                DecodingKey::from_ec_pem(material.as_bytes()).map_err(|e| pem_error("EC", e))
            }
        }
    }
}

fn pem_error(kind: &str, err: jsonwebtoken::errors::Error) -> SecretError {
    SecretError::ServerError(format!("failed to parse {kind} verification key: {err}"))
}


#[cfg(test)]
mod tests {
    use super::test_keys::*;
    use super::*;

    #[test]
    fn supported_names_map_to_families() {
        let cases = [
            ("HS256", AlgorithmFamily::Hmac),
            ("HS512", AlgorithmFamily::Hmac),
            ("RS256", AlgorithmFamily::Rsa),
            ("PS384", AlgorithmFamily::Rsa),
            ("ES256", AlgorithmFamily::Ecdsa),
            ("EdDSA", AlgorithmFamily::EdDsa),
        ];
        for (name, family) in cases {
            assert_eq!(AlgorithmFamily::of(parse_algorithm(name).unwrap()), family, "{name}");
        }
    }

    #[test]
    fn unsupported_names_are_contract_invalid() {
        for name in ["none", "ES512", "hs256", ""] {
            assert!(
                matches!(parse_algorithm(name), Err(SecretError::ContractInvalid(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn hmac_accepts_base64_and_raw() {
        assert!(AlgorithmFamily::Hmac.decode_key("c2VjcmV0").is_ok());
        assert!(AlgorithmFamily::Hmac.decode_key("not base64 at all!").is_ok());
    }

    #[test]
    fn pem_families_decode_their_keys() {
        assert!(AlgorithmFamily::EdDsa.decode_key(ED25519_PUBLIC).is_ok());
        assert!(AlgorithmFamily::Ecdsa.decode_key(EC_P256_PUBLIC).is_ok());
        assert!(AlgorithmFamily::Rsa.decode_key(RSA_PUBLIC).is_ok());
    }

    #[test]
    fn eddsa_rejects_other_pem_types() {
        let result = AlgorithmFamily::EdDsa
            .decode_key("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        assert!(matches!(result, Err(SecretError::ServerError(_))));
    }

    #[test]
    fn garbage_pem_is_server_error() {
        assert!(matches!(
            AlgorithmFamily::Rsa.decode_key("not a pem"),
            Err(SecretError::ServerError(_))
        ));
        assert!(matches!(
            AlgorithmFamily::Ecdsa.decode_key(RSA_PUBLIC),
            Err(SecretError::ServerError(_))
        ));
    }
}
