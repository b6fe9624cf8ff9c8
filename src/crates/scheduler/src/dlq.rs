//! Dead-letter queue for permanently failed tasks
//!
//! Records are appended as one JSON object per line. Appends from
//! concurrent workers are serialized so lines never interleave.

use chrono::{DateTime, Utc};
use engine_core::EngineError;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::retry::ErrorRecord;
use crate::{Result, SchedulerError};

/// One permanently failed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub experiment_id: String,
    pub condition: String,
    pub repeat: u32,
    pub query_id: String,
    pub error: EngineError,
    pub attempts: u32,
    #[serde(default)]
    pub error_history: Vec<ErrorRecord>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only JSONL destination
#[derive(Debug)]
pub struct DeadLetterQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DeadLetterQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file (and its directory) on first use.
    pub async fn write(&self, letter: &DeadLetter) -> Result<()> {
        let mut line = serde_json::to_string(letter)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(
            path = %self.path.display(),
            query_id = %letter.query_id,
            "Wrote dead letter"
        );
        Ok(())
    }

    /// Everything written so far.
    pub async fn read(&self) -> Result<Vec<DeadLetter>> {
        read_dead_letters(&self.path).await
    }
}

/// Parse every record in `path`.
///
/// A missing file reads as empty. Blank lines are skipped; a malformed line
/// is an error.
pub async fn read_dead_letters(path: impl AsRef<Path>) -> Result<Vec<DeadLetter>> {
    let path = path.as_ref();
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == IoErrorKind::NotFound => {
            warn!(path = %path.display(), "Dead-letter file not found, nothing to read");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str::<DeadLetter>(line).map_err(SchedulerError::from))
        .collect()
}
