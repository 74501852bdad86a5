//! Bring-up of the secret provider and the tasks that keep it healthy.
//!
//! # Sequence
//!
//! 1. With security disabled, an [`InsecureProvider`](crate::secret::InsecureProvider)
//!    is built from configuration and nothing else happens.
//! 2. Otherwise a token is obtained (token file or runtime token provider) and
//!    a store client is connected, retrying on the [`StartupTimer`] interval.
//!    A rejected file token is regenerated through the setup service and the
//!    attempt repeats after the retry interval.
//! 3. Once connected, the seed secrets file is imported and scrubbed.
//! 4. A renewal task keeps the store token alive until shutdown.
//!
//! Bring-up observes the shutdown [`CancellationToken`](tokio_util::sync::CancellationToken)
//! between attempts and while sleeping.

pub mod bringup;
pub mod renewal;
pub mod seed;
pub mod timer;

pub use bringup::{bring_up, BootstrapError, BringUpDeps, Provisioned};
pub use renewal::{insecure_refresh_task, token_renewal_task};
pub use timer::StartupTimer;
