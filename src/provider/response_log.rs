//! Append-only log of provider responses
//!
//! Enabled with `JSON_LOG_PATH`. Each entry is a header line, the request line
//! and the pretty-printed body, separated by a blank line.

use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File the responses are appended to
#[derive(Debug, Clone)]
pub struct ResponseLog {
    path: PathBuf,
}

impl ResponseLog {
    /// Log to `path`, creating it on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry stamped with the current time
    pub async fn record(
        &self,
        method: &str,
        url: &str,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let entry = format_entry(Utc::now(), method, url, status, body);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append(&path, &entry))
            .await
            .map_err(std::io::Error::other)?
    }
}

/// Render one log entry
pub fn format_entry(
    timestamp: DateTime<Utc>,
    method: &str,
    url: &str,
    status: u16,
    body: &str,
) -> String {
    let pretty = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| body.to_string());

    format!(
        "--- {} ---\n[{}] {} | Status: {}\n{}\n\n",
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        method,
        url,
        status,
        pretty
    )
}

fn append(path: &Path, entry: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(entry.as_bytes())?;
    file.flush()
}
