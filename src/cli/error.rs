//! CLI error types and conversions

use crate::config::ConfigError;
use crate::poller::PollError;
use crate::provider::signer::SignerError;
use crate::provider::ProviderError;
use crate::suspend::SuspendError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Signing key error
    #[error("signing key error: {0}")]
    Signer(#[from] SignerError),

    /// Provider client error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Session failed
    #[error("poll error: {0}")]
    Poll(#[from] PollError),

    /// Suspension marker error
    #[error("suspension marker error: {0}")]
    Suspend(#[from] SuspendError),
}
