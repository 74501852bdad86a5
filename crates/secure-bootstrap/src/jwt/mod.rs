//! Inbound JWT authentication.
//!
//! A bearer token is parsed without verification to learn its issuer. Tokens
//! minted by the secret store itself are checked by the provider; all others
//! are verified against a per-issuer key fetched from the key lookup service.
//!
//! Callers only ever see [`common::SecretError::Unauthorized`] for a bad
//! token; the precise reason goes to the logs.

pub mod algorithm;
pub mod keys;
pub mod verify;

pub use algorithm::{parse_algorithm, AlgorithmFamily};
pub use keys::{HttpKeyLookup, KeyCache, KeyLookupError, VerificationKeyLookup, VerificationKeyResolver};
pub use verify::{bearer_token, JwtVerifier};
