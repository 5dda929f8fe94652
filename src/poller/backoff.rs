//! Reactive backoff after provider throttles

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// How the loop reacts to `TooManyRequests`
#[async_trait]
pub trait BackoffPolicy: Send {
    /// Sleep until any pending backoff deadline has passed
    async fn wait(&mut self);

    /// Register a throttle; returns the delay it imposes
    async fn handle_throttle(&mut self) -> Duration;

    /// Return to the baseline delay
    fn reset(&mut self);

    /// Delay the next throttle would impose
    fn current_delay(&self) -> Duration;

    /// Wall-clock time before which no call should be made, if any
    fn resume_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Doubling delay with a cap.
///
/// `handle_throttle` only records a deadline; the sleep happens in the next
/// `wait`, so a single invocation can persist the deadline and exit instead.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    wait_until: Option<Instant>,
    resume_at: Option<DateTime<Utc>>,
}

impl ExponentialBackoff {
    /// Create a policy starting at `initial` and never exceeding `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
            wait_until: None,
            resume_at: None,
        }
    }
}

#[async_trait]
impl BackoffPolicy for ExponentialBackoff {
    async fn wait(&mut self) {
        if let Some(until) = self.wait_until {
            let now = Instant::now();
            if until > now {
                info!(
                    wait_secs = (until - now).as_secs(),
                    "Waiting out backoff before next request"
                );
                sleep(until - now).await;
            }
        }
    }

    async fn handle_throttle(&mut self) -> Duration {
        let delay = self.current;
        self.wait_until = Some(Instant::now() + delay);
        self.resume_at = chrono::Duration::from_std(delay)
            .ok()
            .map(|d| Utc::now() + d);

        self.current = self.current.saturating_mul(2).min(self.max);
        debug!(
            delay_secs = delay.as_secs(),
            next_delay_secs = self.current.as_secs(),
            "Throttle registered"
        );
        crate::metrics::record_throttle(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
        self.wait_until = None;
        self.resume_at = None;
    }

    fn current_delay(&self) -> Duration {
        self.current
    }

    fn resume_at(&self) -> Option<DateTime<Utc>> {
        self.resume_at
    }
}

/// Fixed short delay on the first throttle of a streak, long delay after
#[derive(Debug, Clone)]
pub struct BinaryBackoff {
    short: Duration,
    long: Duration,
    throttled_last_attempt: bool,
}

impl BinaryBackoff {
    /// Create a policy
    pub fn new(short: Duration, long: Duration) -> Self {
        Self {
            short,
            long,
            throttled_last_attempt: false,
        }
    }
}

#[async_trait]
impl BackoffPolicy for BinaryBackoff {
    async fn wait(&mut self) {}

    async fn handle_throttle(&mut self) -> Duration {
        let delay = self.current_delay();
        self.throttled_last_attempt = true;
        info!(delay_secs = delay.as_secs(), "Throttled, sleeping");
        crate::metrics::record_throttle(delay);
        sleep(delay).await;
        delay
    }

    fn reset(&mut self) {
        self.throttled_last_attempt = false;
    }

    fn current_delay(&self) -> Duration {
        if self.throttled_last_attempt {
            self.long
        } else {
            self.short
        }
    }
}
