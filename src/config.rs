//! Env-file configuration
//!
//! Values come from a `KEY=value` env file first and the process environment
//! second. The env file is read without touching the process environment, so
//! tests can load several configurations side by side.

use crate::notify::{Notifier, TelegramNotifier};
use crate::poller::backoff::{BackoffPolicy, BinaryBackoff, ExponentialBackoff};
use crate::poller::config as defaults;
use crate::poller::rate_limit::{AdmissionGate, IntervalPacer, RateLimiter};
use crate::provider::models::{ImageSource, LaunchTemplate};
use crate::provider::signer::{Signer, SignerError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Env file exists but could not be read or parsed
    #[error("failed to read env file {path}: {reason}")]
    EnvFile {
        /// Env file path
        path: String,
        /// Read or parse failure
        reason: String,
    },

    /// Required key is missing or empty
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// Key has a value that does not parse
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        /// Offending key
        key: &'static str,
        /// Raw value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Keys are individually valid but contradict each other
    #[error("invalid configuration: {0}")]
    Conflict(String),
}

/// Which backoff policy reacts to throttles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffKind {
    /// Doubling delay with a cap
    #[default]
    Exponential,
    /// Short delay, then long delay while throttles continue
    Binary,
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exponential" => Ok(Self::Exponential),
            "binary" => Ok(Self::Binary),
            _ => Err("expected exponential or binary".to_string()),
        }
    }
}

/// Which admission gate paces outbound calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitMode {
    /// Dual sliding window
    #[default]
    Window,
    /// Fixed interval with jitter
    Interval,
}

impl FromStr for RateLimitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "window" => Ok(Self::Window),
            "interval" => Ok(Self::Interval),
            _ => Err("expected window or interval".to_string()),
        }
    }
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Region identifier, e.g. "eu-frankfurt-1"
    pub region: String,
    /// User OCID
    pub user_id: String,
    /// Tenancy OCID, also the compartment instances are created in
    pub tenancy_id: String,
    /// API key fingerprint
    pub key_fingerprint: String,
    /// PEM private key path
    pub private_key_path: PathBuf,
    /// Explicit availability domains; listed from the API when `None`
    pub availability_domains: Option<Vec<String>>,
    /// Subnet OCID
    pub subnet_id: String,
    /// Image OCID
    pub image_id: Option<String>,
    /// Existing boot volume OCID
    pub boot_volume_id: Option<String>,
    /// Boot volume size override for image launches
    pub boot_volume_size_gbs: Option<u32>,
    /// Shape name
    pub shape: String,
    /// OCPUs
    pub ocpus: u32,
    /// Memory in GB
    pub memory_in_gbs: u32,
    /// SSH public key
    pub ssh_public_key: String,
    /// Ceiling on non-terminated instances of `shape`
    pub max_instances: usize,
    /// Telegram bot key
    pub telegram_bot_api_key: Option<String>,
    /// Telegram chat id
    pub telegram_user_id: Option<String>,
    /// Suspension written after a throttle in single mode
    pub too_many_requests_wait: Duration,
    /// Backoff policy
    pub backoff_kind: BackoffKind,
    /// Exponential: first delay
    pub backoff_initial: Duration,
    /// Exponential: ceiling
    pub backoff_max: Duration,
    /// Binary: first-throttle delay
    pub backoff_short: Duration,
    /// Binary: consecutive-throttle delay
    pub backoff_long: Duration,
    /// Admission gate
    pub rate_limit_mode: RateLimitMode,
    /// Pause after a capacity miss
    pub capacity_retry_delay: Duration,
    /// Pause between daemon cycles
    pub cycle_delay: Duration,
    /// Response log path
    pub json_log_path: Option<PathBuf>,
    /// Suspension marker path
    pub waiter_file: PathBuf,
}

impl Config {
    /// Load from `env_file` with process environment fallback.
    ///
    /// A missing env file is not an error.
    pub fn load(env_file: &Path) -> Result<Self, ConfigError> {
        let file_values = read_env_file(env_file)?;
        debug!(
            path = %env_file.display(),
            keys = file_values.len(),
            "Loaded env file"
        );

        Self::from_lookup(|key| {
            file_values
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let availability_domains = match get("OCI_AVAILABILITY_DOMAIN") {
            Some(raw) => Some(parse_availability_domains(&raw)?),
            None => None,
        };

        Ok(Self {
            region: get("OCI_REGION").unwrap_or_default(),
            user_id: get("OCI_USER_ID").unwrap_or_default(),
            tenancy_id: get("OCI_TENANCY_ID").unwrap_or_default(),
            key_fingerprint: get("OCI_KEY_FINGERPRINT").unwrap_or_default(),
            private_key_path: get("OCI_PRIVATE_KEY_FILENAME")
                .map(PathBuf::from)
                .unwrap_or_default(),
            availability_domains,
            subnet_id: get("OCI_SUBNET_ID").unwrap_or_default(),
            image_id: get("OCI_IMAGE_ID"),
            boot_volume_id: get("OCI_BOOT_VOLUME_ID"),
            boot_volume_size_gbs: parse_number::<u32>(
                "OCI_BOOT_VOLUME_SIZE_IN_GBS",
                get("OCI_BOOT_VOLUME_SIZE_IN_GBS"),
                0,
            )
            .map(|v| (v > 0).then_some(v))?,
            shape: get("OCI_SHAPE").unwrap_or_else(|| defaults::DEFAULT_SHAPE.to_string()),
            ocpus: parse_number("OCI_OCPUS", get("OCI_OCPUS"), 4)?,
            memory_in_gbs: parse_number("OCI_MEMORY_IN_GBS", get("OCI_MEMORY_IN_GBS"), 24)?,
            ssh_public_key: get("OCI_SSH_PUBLIC_KEY").unwrap_or_default(),
            max_instances: parse_number("OCI_MAX_INSTANCES", get("OCI_MAX_INSTANCES"), 1)?,
            telegram_bot_api_key: get("TELEGRAM_BOT_API_KEY"),
            telegram_user_id: get("TELEGRAM_USER_ID"),
            too_many_requests_wait: seconds(
                "TOO_MANY_REQUESTS_TIME_WAIT",
                get("TOO_MANY_REQUESTS_TIME_WAIT"),
                defaults::TOO_MANY_REQUESTS_WAIT_SECS,
            )?,
            backoff_kind: parse_enum("BACKOFF_POLICY", get("BACKOFF_POLICY"))?,
            backoff_initial: seconds(
                "BACKOFF_INITIAL_SECONDS",
                get("BACKOFF_INITIAL_SECONDS"),
                defaults::BACKOFF_INITIAL_SECS,
            )?,
            backoff_max: seconds(
                "BACKOFF_MAX_SECONDS",
                get("BACKOFF_MAX_SECONDS"),
                defaults::BACKOFF_MAX_SECS,
            )?,
            backoff_short: seconds(
                "BACKOFF_SHORT_SECONDS",
                get("BACKOFF_SHORT_SECONDS"),
                defaults::BACKOFF_SHORT_SECS,
            )?,
            backoff_long: seconds(
                "BACKOFF_LONG_SECONDS",
                get("BACKOFF_LONG_SECONDS"),
                defaults::BACKOFF_LONG_SECS,
            )?,
            rate_limit_mode: parse_enum("RATE_LIMIT_MODE", get("RATE_LIMIT_MODE"))?,
            capacity_retry_delay: seconds(
                "CAPACITY_RETRY_SECONDS",
                get("CAPACITY_RETRY_SECONDS"),
                defaults::CAPACITY_RETRY_SECS,
            )?,
            cycle_delay: seconds(
                "CYCLE_DELAY_SECONDS",
                get("CYCLE_DELAY_SECONDS"),
                defaults::CYCLE_DELAY_SECS,
            )?,
            json_log_path: get("JSON_LOG_PATH").map(PathBuf::from),
            waiter_file: get("WAITER_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join(defaults::WAITER_FILE_NAME)),
        })
    }

    /// Check required keys and cross-key rules
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required: [(&'static str, bool); 8] = [
            ("OCI_REGION", self.region.is_empty()),
            ("OCI_USER_ID", self.user_id.is_empty()),
            ("OCI_TENANCY_ID", self.tenancy_id.is_empty()),
            ("OCI_KEY_FINGERPRINT", self.key_fingerprint.is_empty()),
            (
                "OCI_PRIVATE_KEY_FILENAME",
                self.private_key_path.as_os_str().is_empty(),
            ),
            ("OCI_SUBNET_ID", self.subnet_id.is_empty()),
            ("OCI_SHAPE", self.shape.is_empty()),
            ("OCI_SSH_PUBLIC_KEY", self.ssh_public_key.is_empty()),
        ];
        if let Some((key, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(ConfigError::Missing(*key));
        }

        if self.image_id.is_none() && self.boot_volume_id.is_none() {
            return Err(ConfigError::Conflict(
                "one of OCI_IMAGE_ID or OCI_BOOT_VOLUME_ID must be set".to_string(),
            ));
        }

        if self.boot_volume_id.is_some() && self.boot_volume_size_gbs.is_some() {
            return Err(ConfigError::Conflict(
                "OCI_BOOT_VOLUME_ID and OCI_BOOT_VOLUME_SIZE_IN_GBS cannot both be set"
                    .to_string(),
            ));
        }

        if self.backoff_initial.is_zero() || self.backoff_max.is_zero() {
            return Err(ConfigError::Conflict(
                "backoff delays must be positive".to_string(),
            ));
        }

        if self.backoff_initial > self.backoff_max {
            return Err(ConfigError::Conflict(
                "BACKOFF_INITIAL_SECONDS must not exceed BACKOFF_MAX_SECONDS".to_string(),
            ));
        }

        if self.backoff_short.is_zero() || self.backoff_long.is_zero() {
            return Err(ConfigError::Conflict(
                "binary backoff delays must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Compute API base URL for the region
    pub fn compute_endpoint(&self) -> String {
        format!("https://iaas.{}.oraclecloud.com/20160918", self.region)
    }

    /// Identity API base URL for the region
    pub fn identity_endpoint(&self) -> String {
        format!("https://identity.{}.oraclecloud.com/20160918", self.region)
    }

    /// Load the signing key and build the request signer
    pub fn signer(&self) -> Result<Signer, SignerError> {
        Signer::from_pem_file(
            &self.tenancy_id,
            &self.user_id,
            &self.key_fingerprint,
            &self.private_key_path,
        )
    }

    /// Backoff policy selected by `BACKOFF_POLICY`
    pub fn backoff_policy(&self) -> Box<dyn BackoffPolicy> {
        match self.backoff_kind {
            BackoffKind::Exponential => {
                Box::new(ExponentialBackoff::new(self.backoff_initial, self.backoff_max))
            }
            BackoffKind::Binary => Box::new(BinaryBackoff::new(self.backoff_short, self.backoff_long)),
        }
    }

    /// Admission gate selected by `RATE_LIMIT_MODE`
    pub fn admission_gate(&self) -> Arc<dyn AdmissionGate> {
        match self.rate_limit_mode {
            RateLimitMode::Window => Arc::new(RateLimiter::oci_default()),
            RateLimitMode::Interval => Arc::new(IntervalPacer::default()),
        }
    }

    /// Launch request template
    pub fn launch_template(&self) -> LaunchTemplate {
        let source = match &self.boot_volume_id {
            Some(boot_volume_id) => ImageSource::BootVolume {
                boot_volume_id: boot_volume_id.clone(),
            },
            None => ImageSource::Image {
                image_id: self.image_id.clone().unwrap_or_default(),
                boot_volume_size_gbs: self.boot_volume_size_gbs,
            },
        };

        LaunchTemplate {
            compartment_id: self.tenancy_id.clone(),
            shape: self.shape.clone(),
            ocpus: self.ocpus,
            memory_in_gbs: self.memory_in_gbs,
            subnet_id: self.subnet_id.clone(),
            ssh_public_key: self.ssh_public_key.clone(),
            source,
        }
    }

    /// Telegram notifier, when both bot key and chat id are set
    pub fn notifier(&self) -> Option<Arc<dyn Notifier>> {
        match (&self.telegram_bot_api_key, &self.telegram_user_id) {
            (Some(key), Some(chat)) => Some(Arc::new(TelegramNotifier::new(key, chat))),
            _ => None,
        }
    }
}

/// Parse `OCI_AVAILABILITY_DOMAIN`: a single name or a JSON array of names
pub fn parse_availability_domains(raw: &str) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();
    if !raw.starts_with('[') {
        return Ok(vec![raw.to_string()]);
    }

    let names: Vec<String> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "OCI_AVAILABILITY_DOMAIN",
            value: raw.to_string(),
            reason: e.to_string(),
        })?;

    let names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    if names.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "OCI_AVAILABILITY_DOMAIN",
            value: raw.to_string(),
            reason: "array is empty".to_string(),
        });
    }
    Ok(names)
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenv::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => {
            return Err(ConfigError::EnvFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    iter.map(|item| {
        item.map_err(|e| ConfigError::EnvFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    })
    .collect()
}

fn parse_number<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn seconds(key: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    parse_number(key, value, default).map(Duration::from_secs)
}

fn parse_enum<T>(key: &'static str, value: Option<String>) -> Result<T, ConfigError>
where
    T: FromStr<Err = String> + Default,
{
    match value {
        None => Ok(T::default()),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|reason| ConfigError::InvalidValue {
                key,
                value: raw,
                reason,
            }),
    }
}
