//! Durable "do not run before" marker
//!
//! A throttled single invocation records when the next invocation may talk to
//! the provider again. The marker is checked before any network call.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{info, warn};

mod file;

pub use file::FileSuspensionStore;

/// Suspension marker errors
#[derive(Debug, thiserror::Error)]
pub enum SuspendError {
    /// Marker file could not be read or written
    #[error("IO error: {0}")]
    Io(String),

    /// Advisory lock could not be taken
    #[error("lock error: {0}")]
    Lock(String),

    /// Marker content is not an RFC 3339 timestamp
    #[error("corrupt suspension marker {content:?}: {reason}")]
    Corrupt {
        /// Raw marker content
        content: String,
        /// Parse failure
        reason: String,
    },
}

/// Storage for the suspension deadline
pub trait SuspensionStore: Send + Sync {
    /// Stored deadline, `None` when no marker exists
    fn deadline(&self) -> Result<Option<DateTime<Utc>>, SuspendError>;

    /// Persist a deadline, replacing any previous one
    fn set_deadline(&self, until: DateTime<Utc>) -> Result<(), SuspendError>;

    /// Remove the marker. Removing a missing marker succeeds.
    fn clear(&self) -> Result<(), SuspendError>;
}

/// Deadline still in force at `now`.
///
/// Past markers are removed; corrupt markers are removed and ignored.
pub fn active_until(
    store: &dyn SuspensionStore,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, SuspendError> {
    match store.deadline() {
        Ok(Some(until)) if until > now => Ok(Some(until)),
        Ok(Some(until)) => {
            info!(expired_at = %until, "Suspension marker expired, removing");
            store.clear()?;
            Ok(None)
        }
        Ok(None) => Ok(None),
        Err(SuspendError::Corrupt { content, reason }) => {
            warn!(content = %content, reason = %reason, "Removing corrupt suspension marker");
            store.clear()?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// In-process store, for tests and daemon runs without a marker file
#[derive(Debug, Default)]
pub struct MemorySuspensionStore {
    deadline: Mutex<Option<DateTime<Utc>>>,
}

impl MemorySuspensionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a deadline
    pub fn with_deadline(until: DateTime<Utc>) -> Self {
        Self {
            deadline: Mutex::new(Some(until)),
        }
    }
}

impl SuspensionStore for MemorySuspensionStore {
    fn deadline(&self) -> Result<Option<DateTime<Utc>>, SuspendError> {
        self.deadline
            .lock()
            .map(|guard| *guard)
            .map_err(|e| SuspendError::Lock(e.to_string()))
    }

    fn set_deadline(&self, until: DateTime<Utc>) -> Result<(), SuspendError> {
        let mut guard = self
            .deadline
            .lock()
            .map_err(|e| SuspendError::Lock(e.to_string()))?;
        *guard = Some(until);
        Ok(())
    }

    fn clear(&self) -> Result<(), SuspendError> {
        let mut guard = self
            .deadline
            .lock()
            .map_err(|e| SuspendError::Lock(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}
