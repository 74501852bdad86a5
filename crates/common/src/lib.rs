//! Common types, protocol definitions, and errors shared across the secure bootstrap crates.

pub mod error;
pub mod protocol;

pub use error::SecretError;
