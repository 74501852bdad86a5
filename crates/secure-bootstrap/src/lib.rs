//! Secret provisioning and token lifecycle for platform services.
//!
//! A service obtains its secrets through a [`secret::SecretProvider`]: either
//! the [`secret::SecureProvider`], backed by an external secret store and a
//! renewable token, or the [`secret::InsecureProvider`] for development.
//! [`bootstrap`] brings the provider up, [`jwt`] authenticates inbound
//! requests, and [`server`] exposes the HTTP surface.

pub mod bootstrap;
pub mod config;
pub mod jwt;
pub mod secret;
pub mod server;
pub mod store;
pub mod telemetry;
