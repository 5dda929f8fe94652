//! OCI compute provider access

use crate::provider::classify::{classify, ErrorClass};
use crate::provider::signer::SignerError;
use crate::{AvailabilityDomain, Instance};
use async_trait::async_trait;
use serde::Deserialize;

pub mod classify;
pub mod http;
pub mod models;
pub mod response_log;
pub mod signer;

/// Error body returned by the provider on non-2xx responses
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    /// HTTP status code
    #[serde(skip)]
    pub status: u16,
    /// Provider error code (e.g. "TooManyRequests")
    #[serde(default)]
    pub code: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Build an API error from its parts
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Parse a response body; a body that is not `{code, message}` becomes the message
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiError>(body) {
            Ok(mut err) => {
                err.status = status;
                err
            }
            Err(_) => Self::new(status, "", body),
        }
    }

    /// Classification of this error
    pub fn class(&self) -> ErrorClass {
        classify(self.status, &self.code, &self.message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {} [{}]: {}", self.status, self.code, self.message)
    }
}

/// Provider errors
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Non-2xx response from the provider
    #[error("API error: {0}")]
    Api(ApiError),

    /// Connection, DNS, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Request could not be signed
    #[error("signing error: {0}")]
    Signing(#[from] SignerError),

    /// 2xx response whose body did not decode
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Classification used by the poll loop. Only API errors can be recoverable.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Api(err) => err.class(),
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether the request never produced a response
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Compute operations the poll loop needs
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// List instances in the tenancy
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>>;

    /// List availability domains in the region
    async fn list_availability_domains(&self) -> ProviderResult<Vec<AvailabilityDomain>>;

    /// Launch one instance in the given availability domain
    async fn create_instance(&self, availability_domain: &str) -> ProviderResult<Instance>;
}
