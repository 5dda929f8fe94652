//! Observability metrics for the capacity poller
//!
//! Counts signed API calls, throttles and capacity misses, and measures how
//! long the admission gate and the backoff policy hold the loop back.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter, enabled with `--metrics-addr`
//! - Without an exporter every macro call is a no-op

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "Total number of signed requests sent to the OCI API"
    );

    describe_histogram!(
        "api_request_duration_seconds",
        Unit::Seconds,
        "OCI API request duration in seconds"
    );

    describe_counter!(
        "api_throttles_total",
        Unit::Count,
        "Total number of TooManyRequests responses"
    );

    describe_counter!(
        "capacity_misses_total",
        Unit::Count,
        "Launch attempts rejected with Out of host capacity"
    );

    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting at the admission gate"
    );

    describe_histogram!(
        "backoff_delay_seconds",
        Unit::Seconds,
        "Delay chosen by the backoff policy after a throttle"
    );

    describe_counter!(
        "poll_sessions_total",
        Unit::Count,
        "Completed poll sessions by outcome"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one API call
pub struct ApiCallMetrics {
    operation: &'static str,
    start_time: Instant,
    correlation_id: String,
}

impl ApiCallMetrics {
    /// Start recording a call for `operation` (e.g. "create_instance")
    pub fn start(operation: &'static str) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            operation = operation,
            "Starting API call"
        );

        Self {
            operation,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "api_requests_total",
            "operation" => self.operation,
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "api_request_duration_seconds",
            "operation" => self.operation,
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            operation = self.operation,
            status = status_code,
            duration_ms = duration.as_millis(),
            "API call completed"
        );
    }

    /// Record a call that never got a response
    pub fn record_transport_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "api_requests_total",
            "operation" => self.operation,
            "status" => "transport_error",
        )
        .increment(1);

        warn!(
            correlation_id = %self.correlation_id,
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Transport error recorded"
        );
    }

    /// Correlation ID for this call
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a throttle and the delay the backoff policy chose for it
pub fn record_throttle(delay: Duration) {
    counter!("api_throttles_total").increment(1);
    histogram!("backoff_delay_seconds").record(delay.as_secs_f64());
}

/// Record an "Out of host capacity" answer for one availability domain
pub fn record_capacity_miss(availability_domain: &str) {
    counter!(
        "capacity_misses_total",
        "availability_domain" => availability_domain.to_string(),
    )
    .increment(1);
}

/// Record time spent at the admission gate
pub fn record_rate_limit_wait(waited: Duration) {
    histogram!("rate_limit_wait_seconds").record(waited.as_secs_f64());
}

/// Record the end of a poll session
pub fn record_session(outcome: &'static str) {
    counter!("poll_sessions_total", "outcome" => outcome).increment(1);
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
