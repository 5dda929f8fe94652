//! Scripted provider and notifier doubles for orchestrator tests

use async_trait::async_trait;
use oci_capacity_hunter::notify::{NotifyError, Notifier};
use oci_capacity_hunter::poller::{PollSettings, RunMode};
use oci_capacity_hunter::provider::{ApiError, ComputeProvider, ProviderError, ProviderResult};
use oci_capacity_hunter::{AvailabilityDomain, Instance, LifecycleState};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const SHAPE: &str = "VM.Standard.A1.Flex";

/// What the provider answers to one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Capacity,
    Throttle,
    Fatal,
    Transport,
}

impl Reply {
    fn error(self) -> ProviderError {
        match self {
            Reply::Ok => unreachable!("not an error reply"),
            Reply::Capacity => ProviderError::Api(ApiError::new(
                500,
                "InternalError",
                "Out of host capacity.",
            )),
            Reply::Throttle => ProviderError::Api(ApiError::new(
                429,
                "TooManyRequests",
                "Too many requests for the user",
            )),
            Reply::Fatal => ProviderError::Api(ApiError::new(
                404,
                "NotAuthorizedOrNotFound",
                "Authorization failed or requested resource not found",
            )),
            Reply::Transport => ProviderError::Transport("connection reset by peer".into()),
        }
    }
}

pub fn instance(availability_domain: &str, state: LifecycleState) -> Instance {
    Instance {
        id: format!("ocid1.instance.oc1..{availability_domain}"),
        availability_domain: availability_domain.to_string(),
        compartment_id: "ocid1.tenancy.oc1..tenancy".to_string(),
        display_name: "instance-20240101-1200".to_string(),
        shape: SHAPE.to_string(),
        lifecycle_state: state,
    }
}

/// Provider answering from scripts. Unscripted launches report no capacity.
#[derive(Default)]
pub struct ScriptedProvider {
    existing: Vec<Instance>,
    domains: Vec<String>,
    list_replies: Mutex<VecDeque<Reply>>,
    create_replies: Mutex<VecDeque<Reply>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    list_calls: Mutex<usize>,
    domain_calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(create_replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            create_replies: Mutex::new(create_replies.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_existing(mut self, existing: Vec<Instance>) -> Self {
        self.existing = existing;
        self
    }

    pub fn with_domains(mut self, domains: &[&str]) -> Self {
        self.domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_list_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        *self.list_replies.lock().unwrap() = replies.into_iter().collect();
        self
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempted_domains(&self) -> Vec<String> {
        self.attempts().into_iter().map(|(ad, _)| ad).collect()
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn domain_calls(&self) -> usize {
        *self.domain_calls.lock().unwrap()
    }
}

#[async_trait]
impl ComputeProvider for ScriptedProvider {
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        *self.list_calls.lock().unwrap() += 1;
        match self.list_replies.lock().unwrap().pop_front() {
            None | Some(Reply::Ok) => Ok(self.existing.clone()),
            Some(reply) => Err(reply.error()),
        }
    }

    async fn list_availability_domains(&self) -> ProviderResult<Vec<AvailabilityDomain>> {
        *self.domain_calls.lock().unwrap() += 1;
        Ok(self
            .domains
            .iter()
            .map(|name| AvailabilityDomain {
                name: name.clone(),
                id: String::new(),
                compartment_id: String::new(),
            })
            .collect())
    }

    async fn create_instance(&self, availability_domain: &str) -> ProviderResult<Instance> {
        self.attempts
            .lock()
            .unwrap()
            .push((availability_domain.to_string(), Instant::now()));

        let reply = self
            .create_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Capacity);
        match reply {
            Reply::Ok => Ok(instance(availability_domain, LifecycleState::Provisioning)),
            other => Err(other.error()),
        }
    }
}

/// Notifier that records messages and optionally fails
#[derive(Default)]
pub struct RecordingNotifier {
    pub fail: bool,
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(NotifyError::Http("bot unreachable".into()));
        }
        Ok(())
    }
}

pub fn settings(mode: RunMode, targets: Option<&[&str]>) -> PollSettings {
    PollSettings {
        mode,
        shape: SHAPE.to_string(),
        max_instances: 1,
        targets: targets.map(|t| t.iter().map(|s| s.to_string()).collect()),
        capacity_pacing: Duration::from_secs(16),
        cycle_delay: Duration::from_secs(60),
        throttle_suspension: Duration::from_secs(300),
    }
}
