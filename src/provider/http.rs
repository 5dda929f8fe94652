//! Signed HTTP client for the OCI compute and identity APIs
//!
//! Every call goes through the same pipeline: admission gate, request build,
//! signing, send, then classification of the answer into a typed payload or
//! a [`ProviderError`].

use super::models::LaunchTemplate;
use super::response_log::ResponseLog;
use super::signer::Signer;
use super::{ApiError, ComputeProvider, ProviderError, ProviderResult};
use crate::config::Config;
use crate::metrics::ApiCallMetrics;
use crate::poller::rate_limit::AdmissionGate;
use crate::{AvailabilityDomain, Instance};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OCI API client
pub struct ApiClient {
    client: reqwest::Client,
    signer: Arc<Signer>,
    gate: Arc<dyn AdmissionGate>,
    compute_url: String,
    identity_url: String,
    template: LaunchTemplate,
    response_log: Option<ResponseLog>,
}

impl ApiClient {
    /// Create a client against explicit endpoints
    pub fn new(
        signer: Signer,
        gate: Arc<dyn AdmissionGate>,
        template: LaunchTemplate,
        compute_url: impl Into<String>,
        identity_url: impl Into<String>,
    ) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            signer: Arc::new(signer),
            gate,
            compute_url: compute_url.into().trim_end_matches('/').to_string(),
            identity_url: identity_url.into().trim_end_matches('/').to_string(),
            template,
            response_log: None,
        })
    }

    /// Create a client for the configured region, key and gate
    pub fn from_config(config: &Config) -> ProviderResult<Self> {
        let client = Self::new(
            config.signer()?,
            config.admission_gate(),
            config.launch_template(),
            config.compute_endpoint(),
            config.identity_endpoint(),
        )?;

        Ok(match &config.json_log_path {
            Some(path) => client.with_response_log(ResponseLog::new(path)),
            None => client,
        })
    }

    /// Append create-instance and failed responses to `log`
    pub fn with_response_log(mut self, log: ResponseLog) -> Self {
        self.response_log = Some(log);
        self
    }

    fn list_url(&self, base: &str, resource: &str) -> ProviderResult<Url> {
        Url::parse_with_params(
            &format!("{base}/{resource}/"),
            &[("compartmentId", self.template.compartment_id.as_str())],
        )
        .map_err(|e| ProviderError::InvalidRequest(e.to_string()))
    }

    async fn execute(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Vec<u8>,
        log_success: bool,
    ) -> ProviderResult<String> {
        self.gate.wait().await;

        let mut builder = self.client.request(method.clone(), url.clone());
        if !body.is_empty() {
            builder = builder.body(body.clone());
        }
        let mut request = builder
            .build()
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        self.signer.sign(&mut request, &body)?;

        let call = ApiCallMetrics::start(operation);
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                call.record_transport_error();
                return Err(ProviderError::Transport(e.to_string()));
            }
        };

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            call.record_transport_error();
            ProviderError::Transport(e.to_string())
        })?;
        call.record_complete(status.as_u16());

        if !status.is_success() || log_success {
            self.log_response(&method, &url, status.as_u16(), &text).await;
        }

        if status.is_success() {
            debug!(operation, status = status.as_u16(), "API call succeeded");
            Ok(text)
        } else {
            let err = ApiError::from_body(status.as_u16(), &text);
            debug!(
                operation,
                status = err.status,
                code = %err.code,
                class = %err.class(),
                "API call failed: {}",
                err.class().description()
            );
            Err(ProviderError::Api(err))
        }
    }

    async fn log_response(&self, method: &Method, url: &Url, status: u16, body: &str) {
        if let Some(log) = &self.response_log {
            if let Err(e) = log.record(method.as_str(), url.as_str(), status, body).await {
                warn!(path = %log.path().display(), error = %e, "Failed to write response log");
            }
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &str, body: &str) -> ProviderResult<T> {
    serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("{operation}: {e}")))
}

#[async_trait]
impl ComputeProvider for ApiClient {
    async fn list_instances(&self) -> ProviderResult<Vec<Instance>> {
        let url = self.list_url(&self.compute_url, "instances")?;
        let body = self
            .execute("list_instances", Method::GET, url, Vec::new(), false)
            .await?;
        decode("list_instances", &body)
    }

    async fn list_availability_domains(&self) -> ProviderResult<Vec<AvailabilityDomain>> {
        let url = self.list_url(&self.identity_url, "availabilityDomains")?;
        let body = self
            .execute("list_availability_domains", Method::GET, url, Vec::new(), false)
            .await?;
        decode("list_availability_domains", &body)
    }

    async fn create_instance(&self, availability_domain: &str) -> ProviderResult<Instance> {
        let url = Url::parse(&format!("{}/instances/", self.compute_url))
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
        let details = self.template.details(availability_domain, Utc::now());
        let payload = serde_json::to_vec(&details)
            .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;

        info!(
            availability_domain,
            shape = %details.shape,
            display_name = %details.display_name,
            "Requesting instance"
        );

        let body = self
            .execute("create_instance", Method::POST, url, payload, true)
            .await?;
        decode("create_instance", &body)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("compute_url", &self.compute_url)
            .field("identity_url", &self.identity_url)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}
