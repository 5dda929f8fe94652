//! File-backed suspension marker

use super::{SuspendError, SuspensionStore};
use chrono::{DateTime, SecondsFormat, Utc};
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker stored as a plain-text RFC 3339 timestamp.
///
/// Writes go through a temp file renamed into place; readers and writers
/// coordinate through an advisory lock on a sibling `.lock` file.
#[derive(Debug, Clone)]
pub struct FileSuspensionStore {
    path: PathBuf,
}

impl FileSuspensionStore {
    /// Store the marker at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Marker file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(&self) -> Result<RwLock<File>, SuspendError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SuspendError::Io(e.to_string()))?;
            }
        }

        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| SuspendError::Lock(format!("Failed to create lock file: {e}")))?;
        Ok(RwLock::new(file))
    }
}

impl SuspensionStore for FileSuspensionStore {
    fn deadline(&self) -> Result<Option<DateTime<Utc>>, SuspendError> {
        let lock = self.lock_file()?;
        let _guard = lock
            .read()
            .map_err(|e| SuspendError::Lock(format!("Failed to acquire read lock: {e}")))?;

        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SuspendError::Io(e.to_string())),
        };
        let content = String::from_utf8(bytes).map_err(|e| SuspendError::Corrupt {
            content: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            reason: e.to_string(),
        })?;

        let trimmed = content.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| SuspendError::Corrupt {
                content: trimmed.to_string(),
                reason: e.to_string(),
            })
    }

    fn set_deadline(&self, until: DateTime<Utc>) -> Result<(), SuspendError> {
        let mut lock = self.lock_file()?;
        let _guard = lock
            .write()
            .map_err(|e| SuspendError::Lock(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| SuspendError::Io(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(until.to_rfc3339_opts(SecondsFormat::Secs, true).as_bytes())
            .map_err(|e| SuspendError::Io(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| SuspendError::Io(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| SuspendError::Io(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(&self.path)
            .map_err(|e| SuspendError::Io(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        info!(path = %self.path.display(), until = %until, "Suspension marker written");
        Ok(())
    }

    fn clear(&self) -> Result<(), SuspendError> {
        let mut lock = self.lock_file()?;
        let _guard = lock
            .write()
            .map_err(|e| SuspendError::Lock(format!("Failed to acquire write lock: {e}")))?;

        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Suspension marker removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SuspendError::Io(e.to_string())),
        }
    }
}
