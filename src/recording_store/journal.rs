//! JSONL recording journal
//!
//! One serialized line per outcome, appended to `recordings.jsonl` under the
//! recordings base directory. Survives restarts, greppable, and trivially
//! importable into a real store later.

use super::{FailedRecording, NewRecording, RecordingStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Journal line shape. `outcome` is `completed` or `failed`; fields that do
/// not apply to the outcome are omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    pub camera_id: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub triggered_by_motion: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Append-only JSONL store.
pub struct JsonlRecordingStore {
    path: PathBuf,
    // serializes appends so concurrent outcomes never interleave lines
    writer: Mutex<()>,
}

impl JsonlRecordingStore {
    pub const FILE_NAME: &'static str = "recordings.jsonl";

    /// Open (and create if needed) the journal under `base_dir`.
    pub async fn open(base_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(base_dir).await?;
        Ok(Self {
            path: base_dir.join(Self::FILE_NAME),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let _guard = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::Internal(format!("cannot open journal {}: {}", self.path.display(), e))
            })?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordingStore for JsonlRecordingStore {
    async fn create_recording(&self, recording: NewRecording) -> Result<Uuid> {
        let record_id = Uuid::new_v4();
        self.append(&JournalEntry {
            record_id: Some(record_id),
            camera_id: recording.camera_id,
            outcome: "completed".to_string(),
            file_path: Some(recording.file_path),
            file_size_bytes: Some(recording.file_size_bytes),
            duration_secs: Some(recording.duration_secs),
            triggered_by_motion: recording.triggered_by_motion,
            reason: None,
            detail: None,
            created_at: Utc::now(),
        })
        .await?;
        Ok(record_id)
    }

    async fn record_failure(&self, failure: FailedRecording) -> Result<()> {
        self.append(&JournalEntry {
            record_id: None,
            camera_id: failure.camera_id,
            outcome: "failed".to_string(),
            file_path: None,
            file_size_bytes: None,
            duration_secs: None,
            triggered_by_motion: failure.triggered_by_motion,
            reason: Some(failure.reason),
            detail: Some(failure.detail),
            created_at: Utc::now(),
        })
        .await
    }
}
