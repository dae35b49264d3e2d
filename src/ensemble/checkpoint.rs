//! Checkpoint Store: a directory of run folders persisting mode outputs
//! and streaming synthesis progress, with resume and retention cleanup.
//! See spec §4.6.7 and §6 "Persisted state layout".

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::ensemble::capture::ModeOutput;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("run '{0}' not found")]
    NotFound(String),
    #[error("concurrent write to run '{0}' detected")]
    ConcurrentWrite(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Synthesizing,
    Done,
    Errored,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub run_id: String,
    pub session_name: String,
    pub question: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub completed_mode_ids: Vec<String>,
    pub pending_mode_ids: Vec<String>,
    pub errored_mode_ids: Vec<String>,
    pub total_modes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingCheckpoint {
    pub run_id: String,
    pub session_name: String,
    pub last_chunk_index: u64,
    pub error: Option<String>,
}

/// Directory-backed store. Every write goes through tempfile+rename
/// (spec §5 "atomic rename-over-tempfile for every write"); concurrent
/// writes to the same run id are rejected by an existence check on the
/// in-progress marker.
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn metadata_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("metadata.json")
    }

    fn synthesis_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("synthesis.json")
    }

    fn output_path(&self, run_id: &str, mode_id: &str) -> PathBuf {
        self.run_dir(run_id).join("outputs").join(format!("{mode_id}.json"))
    }

    fn lock_path(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(".write-lock")
    }

    pub async fn create(&self, metadata: &CheckpointMetadata) -> Result<(), CheckpointError> {
        fs::create_dir_all(self.run_dir(&metadata.run_id).join("outputs")).await?;
        self.write_metadata(metadata).await
    }

    pub async fn write_metadata(&self, metadata: &CheckpointMetadata) -> Result<(), CheckpointError> {
        atomic_write_json(&self.metadata_path(&metadata.run_id), metadata).await
    }

    pub async fn read_metadata(&self, run_id: &str) -> Result<CheckpointMetadata, CheckpointError> {
        read_json(&self.metadata_path(run_id)).await.map_err(|_| CheckpointError::NotFound(run_id.to_string()))
    }

    /// Persists one mode's parsed output. Concurrent writers to the same
    /// run are detected via a lock-file existence check; the second writer
    /// gets `ConcurrentWrite` instead of silently racing the rename.
    pub async fn write_mode_output(&self, run_id: &str, output: &ModeOutput) -> Result<(), CheckpointError> {
        let lock = self.lock_path(run_id);
        if fs::metadata(&lock).await.is_ok() {
            return Err(CheckpointError::ConcurrentWrite(run_id.to_string()));
        }
        fs::write(&lock, b"").await?;
        fs::create_dir_all(self.run_dir(run_id).join("outputs")).await?;
        let result = atomic_write_json(&self.output_path(run_id, &output.mode_id), output).await;
        let _ = fs::remove_file(&lock).await;
        result
    }

    pub async fn read_mode_output(&self, run_id: &str, mode_id: &str) -> Result<ModeOutput, CheckpointError> {
        read_json(&self.output_path(run_id, mode_id)).await
    }

    /// Persists the highest index written after each streamed chunk
    /// (spec §4.6.7).
    pub async fn write_streaming_checkpoint(&self, checkpoint: &StreamingCheckpoint) -> Result<(), CheckpointError> {
        atomic_write_json(&self.synthesis_path(&checkpoint.run_id), checkpoint).await
    }

    pub async fn read_streaming_checkpoint(&self, run_id: &str) -> Result<StreamingCheckpoint, CheckpointError> {
        match read_json(&self.synthesis_path(run_id)).await {
            Ok(cp) => Ok(cp),
            Err(_) => Ok(StreamingCheckpoint {
                run_id: run_id.to_string(),
                session_name: String::new(),
                last_chunk_index: 0,
                error: None,
            }),
        }
    }

    /// Removes run folders older than `max_age`, or all of them if
    /// `max_age` is `None` (spec §4.6.7 `clean-checkpoints`).
    pub async fn clean(&self, max_age: Option<std::time::Duration>) -> Result<usize, CheckpointError> {
        if !fs::metadata(&self.root).await.is_ok() {
            return Ok(0);
        }
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;
        let cutoff = max_age.map(|d| Utc::now() - ChronoDuration::from_std(d).unwrap_or(ChronoDuration::days(7)));

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let run_id = entry.file_name().to_string_lossy().to_string();
            let should_remove = match &cutoff {
                None => true,
                Some(cutoff) => match self.read_metadata(&run_id).await {
                    Ok(meta) => meta.created_at < *cutoff,
                    Err(_) => true,
                },
            };
            if should_remove {
                fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub(crate) async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let text = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, text).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub(crate) async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CheckpointError> {
    let text = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}
