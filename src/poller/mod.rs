//! Poll loop: admission control, backoff and the session state machine

use crate::config::Config;
use crate::provider::ProviderError;
use crate::suspend::SuspendError;
use crate::Instance;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod backoff;
pub mod config;
pub mod orchestrator;
pub mod rate_limit;

pub use backoff::{BackoffPolicy, BinaryBackoff, ExponentialBackoff};
pub use orchestrator::{PollOrchestrator, SessionState};
pub use rate_limit::{AdmissionGate, IntervalPacer, RateLimiter, WindowRule};

/// Errors that end a session
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Provider call failed in a way the loop does not recover from
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Suspension marker could not be read or written
    #[error("suspension marker error: {0}")]
    Suspend(#[from] SuspendError),
}

/// How long a session keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One sweep per invocation, for cron-style scheduling
    Single,
    /// Keep polling until capacity is found or a fatal error occurs
    Daemon,
}

/// Session parameters
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Single or daemon
    pub mode: RunMode,
    /// Shape whose instances count against the ceiling
    pub shape: String,
    /// Ceiling on non-terminated instances of `shape`
    pub max_instances: usize,
    /// Explicit availability domains; listed from the provider when `None`
    pub targets: Option<Vec<String>>,
    /// Pause between targets after a capacity miss
    pub capacity_pacing: Duration,
    /// Pause between daemon cycles
    pub cycle_delay: Duration,
    /// Suspension written by a throttled single invocation
    pub throttle_suspension: Duration,
}

impl PollSettings {
    /// Settings for `mode` taken from the configuration
    pub fn from_config(config: &Config, mode: RunMode) -> Self {
        Self {
            mode,
            shape: config.shape.clone(),
            max_instances: config.max_instances,
            targets: config.availability_domains.clone(),
            capacity_pacing: config.capacity_retry_delay,
            cycle_delay: config.cycle_delay,
            throttle_suspension: config.too_many_requests_wait,
        }
    }
}

/// How a session ended without a fatal error
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Instance launched
    Created(Instance),
    /// Enough instances of the shape already exist
    AtInstanceLimit {
        /// Non-terminated instances of the shape
        existing: usize,
    },
    /// Every target reported no capacity (single mode)
    NoCapacity,
    /// Provider throttled; no calls before `resume_at` (single mode)
    Throttled {
        /// Persisted suspension deadline
        resume_at: DateTime<Utc>,
    },
    /// An earlier throttle is still in force
    Suspended {
        /// Deadline from the marker
        until: DateTime<Utc>,
    },
}

impl SessionOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::AtInstanceLimit { .. } => "at_instance_limit",
            Self::NoCapacity => "no_capacity",
            Self::Throttled { .. } => "throttled",
            Self::Suspended { .. } => "suspended",
        }
    }
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created(instance) => write!(
                f,
                "Instance {} ({}) created in {}",
                instance.display_name, instance.id, instance.availability_domain
            ),
            Self::AtInstanceLimit { existing } => {
                write!(f, "Instance limit reached ({existing} existing), nothing to do")
            }
            Self::NoCapacity => write!(f, "No capacity in any availability domain"),
            Self::Throttled { resume_at } => {
                write!(f, "Throttled by provider, suspended until {}", resume_at.to_rfc3339())
            }
            Self::Suspended { until } => {
                write!(f, "Suspended until {}", until.to_rfc3339())
            }
        }
    }
}
