//! # OCI Capacity Hunter Library
//!
//! Acquires scarce Oracle Cloud compute capacity by repeatedly attempting to
//! launch an instance against an API that throttles aggressively and often
//! answers "Out of host capacity".
//!
//! ## Features
//!
//! - **SDK-free signing**: HTTP Signatures (`rsa-sha256`) built from the raw key
//! - **Proactive rate limiting**: dual sliding-window admission gate, so the
//!   provider's hard throttle is never hit in normal operation
//! - **Backoff**: exponential-with-cap (default) or binary fixed-delay policy
//! - **Cross-run suspension**: a durable "do not run before" marker for
//!   cron-style single invocations
//! - **Notifications**: Telegram message once capacity has been secured
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use oci_capacity_hunter::config::Config;
//! use oci_capacity_hunter::poller::{PollOrchestrator, PollSettings, RunMode};
//! use oci_capacity_hunter::provider::http::ApiClient;
//! use oci_capacity_hunter::suspend::FileSuspensionStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(".env".as_ref())?;
//! config.validate()?;
//!
//! let client = ApiClient::from_config(&config)?;
//! let settings = PollSettings::from_config(&config, RunMode::Single);
//! let mut orchestrator = PollOrchestrator::new(
//!     Arc::new(client),
//!     config.backoff_policy(),
//!     Arc::new(FileSuspensionStore::new(config.waiter_file.clone())),
//!     settings,
//! );
//!
//! let outcome = orchestrator.run().await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`provider`] - signer, error classification and the signed API client
//! - [`poller`] - rate limiter, backoff policies and the poll state machine
//! - [`suspend`] - durable suspension marker
//! - [`notify`] - success notifications
//! - [`config`] - env-file configuration
//! - [`cli`] - command-line entry points
//! - [`metrics`] - Prometheus metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Env-file configuration
pub mod config;

/// Metrics collection and export
pub mod metrics;

/// Success notifications
pub mod notify;

/// Rate limiting, backoff and the poll loop
pub mod poller;

/// OCI API access
pub mod provider;

/// Durable suspension marker
pub mod suspend;

// Re-export commonly used types
pub use provider::classify::{classify, ErrorClass};

/// Lifecycle state of a compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Launch accepted, hardware being prepared
    Provisioning,
    /// Instance is running
    Running,
    /// Booting
    Starting,
    /// Shutting down
    Stopping,
    /// Stopped but still allocated
    Stopped,
    /// Image capture in progress
    CreatingImage,
    /// Being terminated
    Terminating,
    /// Gone, no longer counts against limits
    Terminated,
    /// Moving between hosts
    Moving,
    /// Any state this client does not know about
    #[serde(other)]
    Unknown,
}

impl LifecycleState {
    /// Whether an instance in this state still occupies capacity
    pub fn is_active(&self) -> bool {
        !matches!(self, LifecycleState::Terminated)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Provisioning => "PROVISIONING",
            LifecycleState::Running => "RUNNING",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
            LifecycleState::CreatingImage => "CREATING_IMAGE",
            LifecycleState::Terminating => "TERMINATING",
            LifecycleState::Terminated => "TERMINATED",
            LifecycleState::Moving => "MOVING",
            LifecycleState::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Compute instance as returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Instance OCID
    pub id: String,
    /// Availability domain the instance lives in
    #[serde(default)]
    pub availability_domain: String,
    /// Owning compartment OCID
    #[serde(default)]
    pub compartment_id: String,
    /// Human readable name
    #[serde(default)]
    pub display_name: String,
    /// Shape name (e.g. "VM.Standard.A1.Flex")
    pub shape: String,
    /// Current lifecycle state
    pub lifecycle_state: LifecycleState,
}

impl Instance {
    /// Whether this instance counts towards the configured instance ceiling
    pub fn occupies(&self, shape: &str) -> bool {
        self.shape == shape && self.lifecycle_state.is_active()
    }
}

/// Availability domain (deployment zone) within a region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDomain {
    /// Domain name, e.g. "Uocm:EU-FRANKFURT-1-AD-1"
    pub name: String,
    /// Domain OCID
    #[serde(default)]
    pub id: String,
    /// Compartment the listing was made for
    #[serde(default)]
    pub compartment_id: String,
}
