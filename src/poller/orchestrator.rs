//! Session state machine
//!
//! ```text
//! CheckingSuspension -> CheckingExisting -> EnumeratingTargets
//!     -> AttemptingTarget(i) -> Success | Throttled | Exhausted | Fatal
//! ```
//!
//! plus the terminal `Suspended` and `AtInstanceLimit` states. In single mode
//! one sweep is made per invocation; in daemon mode sweeps repeat until an
//! instance exists or a fatal error occurs.

use super::backoff::BackoffPolicy;
use super::{PollError, PollSettings, RunMode, SessionOutcome};
use crate::notify::{escape_markdown, Notifier};
use crate::provider::classify::ErrorClass;
use crate::provider::{ComputeProvider, ProviderError};
use crate::suspend::{active_until, SuspensionStore};
use crate::Instance;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Where the session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Looking at the suspension marker
    CheckingSuspension,
    /// Counting existing instances
    CheckingExisting,
    /// Resolving availability domains
    EnumeratingTargets,
    /// Launch attempt against the i-th domain
    AttemptingTarget(usize),
    /// Instance created
    Success,
    /// Provider throttled the sweep
    Throttled,
    /// Every domain reported no capacity
    Exhausted,
    /// Unrecoverable error
    Fatal,
    /// Marker still in force
    Suspended,
    /// Ceiling already reached
    AtInstanceLimit,
}

enum Sweep {
    Created(Instance),
    AtLimit(usize),
    Exhausted,
    Throttled(Duration),
}

/// Drives one polling session
pub struct PollOrchestrator {
    provider: Arc<dyn ComputeProvider>,
    backoff: Box<dyn BackoffPolicy>,
    suspension: Arc<dyn SuspensionStore>,
    notifier: Option<Arc<dyn Notifier>>,
    settings: PollSettings,
    state: SessionState,
}

impl PollOrchestrator {
    /// Create an orchestrator without a notifier
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        backoff: Box<dyn BackoffPolicy>,
        suspension: Arc<dyn SuspensionStore>,
        settings: PollSettings,
    ) -> Self {
        Self {
            provider,
            backoff,
            suspension,
            notifier: None,
            settings,
            state: SessionState::CheckingSuspension,
        }
    }

    /// Notify through `notifier` once an instance is created
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to a terminal state
    pub async fn run(&mut self) -> Result<SessionOutcome, PollError> {
        let result = match self.settings.mode {
            RunMode::Single => self.run_single().await,
            RunMode::Daemon => self.run_daemon().await,
        };

        match &result {
            Ok(outcome) => crate::metrics::record_session(outcome.label()),
            Err(e) => {
                self.transition(SessionState::Fatal);
                crate::metrics::record_session("fatal");
                error!(error = %e, "Session failed");
            }
        }
        result
    }

    async fn run_single(&mut self) -> Result<SessionOutcome, PollError> {
        self.transition(SessionState::CheckingSuspension);
        if let Some(until) = active_until(self.suspension.as_ref(), Utc::now())? {
            self.transition(SessionState::Suspended);
            info!(until = %until, "Suspension marker active, skipping this run");
            return Ok(SessionOutcome::Suspended { until });
        }

        match self.sweep().await? {
            Sweep::Created(instance) => self.finish_success(instance).await,
            Sweep::AtLimit(existing) => Ok(SessionOutcome::AtInstanceLimit { existing }),
            Sweep::Exhausted => {
                self.backoff.reset();
                Ok(SessionOutcome::NoCapacity)
            }
            Sweep::Throttled(_) => {
                let wait = chrono::Duration::from_std(self.settings.throttle_suspension)
                    .unwrap_or_else(|_| chrono::Duration::seconds(0));
                let resume_at = Utc::now() + wait;
                self.suspension.set_deadline(resume_at)?;
                warn!(resume_at = %resume_at, "Throttled, suspending further runs");
                Ok(SessionOutcome::Throttled { resume_at })
            }
        }
    }

    async fn run_daemon(&mut self) -> Result<SessionOutcome, PollError> {
        let mut cycle: u64 = 0;
        loop {
            cycle += 1;

            self.transition(SessionState::CheckingSuspension);
            if let Some(until) = active_until(self.suspension.as_ref(), Utc::now())? {
                self.transition(SessionState::Suspended);
                let remaining = (until - Utc::now()).to_std().unwrap_or_default();
                info!(until = %until, wait_secs = remaining.as_secs(), "Sleeping until suspension ends");
                sleep(remaining).await;
                self.suspension.clear()?;
            }

            debug!(cycle, "Starting sweep");
            match self.sweep().await {
                Ok(Sweep::Created(instance)) => return self.finish_success(instance).await,
                Ok(Sweep::AtLimit(existing)) => {
                    return Ok(SessionOutcome::AtInstanceLimit { existing })
                }
                Ok(Sweep::Exhausted) => {
                    self.backoff.reset();
                    info!(
                        cycle,
                        delay_secs = self.settings.cycle_delay.as_secs(),
                        "No capacity this cycle"
                    );
                    sleep(self.settings.cycle_delay).await;
                }
                Ok(Sweep::Throttled(delay)) => {
                    info!(
                        cycle,
                        delay_secs = delay.as_secs(),
                        resume_at = ?self.backoff.resume_at(),
                        "Throttled, backing off"
                    );
                }
                Err(PollError::Provider(e)) if e.is_transport() => {
                    warn!(cycle, error = %e, "Transport failure, retrying next cycle");
                    sleep(self.settings.cycle_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass over the existing instances and every target
    async fn sweep(&mut self) -> Result<Sweep, PollError> {
        self.backoff.wait().await;

        self.transition(SessionState::CheckingExisting);
        let instances = match self.provider.list_instances().await {
            Ok(instances) => instances,
            Err(e) => return self.throttled_or_fatal(e).await,
        };
        let existing = instances
            .iter()
            .filter(|i| i.occupies(&self.settings.shape))
            .count();
        if existing >= self.settings.max_instances {
            self.transition(SessionState::AtInstanceLimit);
            info!(
                existing,
                max_instances = self.settings.max_instances,
                shape = %self.settings.shape,
                "Instance limit reached"
            );
            return Ok(Sweep::AtLimit(existing));
        }

        self.transition(SessionState::EnumeratingTargets);
        let targets = match self.settings.targets.clone() {
            Some(targets) => targets,
            None => match self.provider.list_availability_domains().await {
                Ok(domains) => domains.into_iter().map(|d| d.name).collect(),
                Err(e) => return self.throttled_or_fatal(e).await,
            },
        };
        if targets.is_empty() {
            warn!("Region reported no availability domains");
            self.transition(SessionState::Exhausted);
            return Ok(Sweep::Exhausted);
        }

        for (index, target) in targets.iter().enumerate() {
            self.transition(SessionState::AttemptingTarget(index));
            match self.provider.create_instance(target).await {
                Ok(instance) => return Ok(Sweep::Created(instance)),
                Err(e) => match e.class() {
                    ErrorClass::CapacityExhausted => {
                        crate::metrics::record_capacity_miss(target);
                        info!(availability_domain = %target, "Out of host capacity");
                        if index + 1 < targets.len() {
                            sleep(self.settings.capacity_pacing).await;
                        }
                    }
                    _ => return self.throttled_or_fatal(e).await,
                },
            }
        }

        self.transition(SessionState::Exhausted);
        Ok(Sweep::Exhausted)
    }

    async fn throttled_or_fatal(&mut self, e: ProviderError) -> Result<Sweep, PollError> {
        if e.class() == ErrorClass::Throttled {
            self.transition(SessionState::Throttled);
            let delay = self.backoff.handle_throttle().await;
            warn!(delay_secs = delay.as_secs(), "Provider throttled the request");
            return Ok(Sweep::Throttled(delay));
        }

        if !e.is_transport() {
            error!(suggestion = e.class().suggestion(), "Unrecoverable provider error");
        }
        Err(PollError::Provider(e))
    }

    async fn finish_success(&mut self, instance: Instance) -> Result<SessionOutcome, PollError> {
        self.transition(SessionState::Success);
        info!(
            id = %instance.id,
            availability_domain = %instance.availability_domain,
            lifecycle_state = %instance.lifecycle_state,
            "Instance created"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(&success_message(&instance)).await {
                warn!(error = %e, "Failed to send notification");
            }
        }

        self.backoff.reset();
        if let Err(e) = self.suspension.clear() {
            warn!(error = %e, "Failed to clear suspension marker");
        }
        Ok(SessionOutcome::Created(instance))
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "State transition");
        self.state = next;
    }
}

/// Notification text for a created instance
pub fn success_message(instance: &Instance) -> String {
    format!(
        "*Instance created*\n\nName: {}\nShape: {}\nAvailability domain: {}\nID: `{}`",
        escape_markdown(&instance.display_name),
        escape_markdown(&instance.shape),
        escape_markdown(&instance.availability_domain),
        instance.id
    )
}
