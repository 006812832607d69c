//! Durable store for notification dismissals
//!
//! The worker keeps nothing in memory between events, so anything that must
//! outlive one event goes through a store like this one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One dismissed notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissalRecord {
    pub notification_id: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub dismissed_at: DateTime<Utc>,
}

#[async_trait]
pub trait DismissalStore: Send + Sync {
    async fn record(&self, record: &DismissalRecord) -> Result<()>;
}

/// Appends one JSON line per dismissal
pub struct FileDismissalStore {
    path: PathBuf,
}

impl FileDismissalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record; a missing file means no dismissals yet
    pub fn read_all(&self) -> Result<Vec<DismissalRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open dismissal log: {}", self.path.display()))?;

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("Failed to read dismissal log")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping corrupt dismissal entry: {}", e),
            }
        }
        Ok(records)
    }
}

/// File I/O runs on the blocking pool so the worker's event loop never stalls
#[async_trait]
impl DismissalStore for FileDismissalStore {
    async fn record(&self, record: &DismissalRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize dismissal")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .context("Dismissal writer task failed")?
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create dismissal log directory")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open dismissal log: {}", path.display()))?;

    writeln!(file, "{}", line).context("Failed to append dismissal")?;
    Ok(())
}
