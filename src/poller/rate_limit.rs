//! Proactive admission control
//!
//! Every outbound API call passes through an [`AdmissionGate`] before it is
//! signed. [`RateLimiter`] enforces several sliding windows at once so the
//! provider's own throttle is never reached; [`IntervalPacer`] is the simpler
//! fixed-interval alternative.

use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Margin added to every computed sleep so the binding call has left its window
pub const SAFETY_MARGIN: Duration = Duration::from_millis(1);

/// Gate that admits one call at a time
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Wait until the next call may be sent; returns the time spent waiting
    async fn wait(&self) -> Duration;
}

/// At most `limit` calls in any `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRule {
    /// Calls allowed per window
    pub limit: usize,
    /// Window length
    pub window: Duration,
}

impl WindowRule {
    /// Create a rule. A zero limit is raised to one.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
        }
    }
}

/// Sliding-window rate limiter with one or more ceilings
#[derive(Debug)]
pub struct RateLimiter {
    rules: Vec<WindowRule>,
    longest: Duration,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter enforcing all `rules`
    pub fn new(rules: Vec<WindowRule>) -> Self {
        let longest = rules
            .iter()
            .map(|r| r.window)
            .max()
            .unwrap_or(Duration::ZERO);

        Self {
            rules,
            longest,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// OCI compute ceilings: 10 calls per minute and 4 calls per 10 seconds
    pub fn oci_default() -> Self {
        Self::new(vec![
            WindowRule::new(10, Duration::from_secs(60)),
            WindowRule::new(4, Duration::from_secs(10)),
        ])
    }

    /// Block until a call is admitted, then record it.
    ///
    /// The lock is held across the sleep so concurrent callers queue up
    /// behind the one currently waiting.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        let mut history = self.history.lock().await;

        loop {
            let now = Instant::now();
            while let Some(oldest) = history.front() {
                if now.saturating_duration_since(*oldest) >= self.longest {
                    history.pop_front();
                } else {
                    break;
                }
            }

            match required_sleep(&history, &self.rules, now) {
                Some(delay) => {
                    debug!(
                        delay_ms = delay.as_millis(),
                        recent_calls = history.len(),
                        "Rate window saturated, waiting"
                    );
                    sleep(delay).await;
                }
                None => {
                    history.push_back(now);
                    return now.saturating_duration_since(started);
                }
            }
        }
    }
}

#[async_trait]
impl AdmissionGate for RateLimiter {
    async fn wait(&self) -> Duration {
        let waited = self.acquire().await;
        crate::metrics::record_rate_limit_wait(waited);
        waited
    }
}

/// Smallest sleep that frees a slot in every saturated window, or `None` when
/// a call may go out now.
///
/// For a saturated window the binding call is the oldest of the last `limit`
/// calls inside it; the slot frees once that call is `window` old.
pub fn required_sleep(
    history: &VecDeque<Instant>,
    rules: &[WindowRule],
    now: Instant,
) -> Option<Duration> {
    rules
        .iter()
        .filter_map(|rule| {
            let in_window: Vec<&Instant> = history
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < rule.window)
                .collect();

            if in_window.len() < rule.limit {
                return None;
            }

            let binding = *in_window[in_window.len() - rule.limit];
            let expires = binding + rule.window;
            Some(expires.saturating_duration_since(now) + SAFETY_MARGIN)
        })
        .min()
}

/// Minimum spacing between calls plus random jitter
#[derive(Debug)]
pub struct IntervalPacer {
    interval: Duration,
    max_jitter: Duration,
    last: Mutex<Option<Instant>>,
}

impl IntervalPacer {
    /// Default spacing between calls
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20);

    /// Default upper bound of the random jitter
    pub const DEFAULT_JITTER: Duration = Duration::from_secs(2);

    /// Create a pacer
    pub fn new(interval: Duration, max_jitter: Duration) -> Self {
        Self {
            interval,
            max_jitter,
            last: Mutex::new(None),
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

impl Default for IntervalPacer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL, Self::DEFAULT_JITTER)
    }
}

#[async_trait]
impl AdmissionGate for IntervalPacer {
    async fn wait(&self) -> Duration {
        let started = Instant::now();
        let mut last = self.last.lock().await;

        if let Some(previous) = *last {
            let due = previous + self.interval + self.jitter();
            let now = Instant::now();
            if due > now {
                debug!(delay_ms = (due - now).as_millis(), "Pacing request");
                sleep(due - now).await;
            }
        }

        *last = Some(Instant::now());
        let waited = Instant::now().saturating_duration_since(started);
        crate::metrics::record_rate_limit_wait(waited);
        waited
    }
}
