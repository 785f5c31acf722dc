//! RecordingStore - Recording Outcome Collaborator
//!
//! ## Responsibilities
//!
//! - Collaborator interface receiving finished/failed recording outcomes
//! - Bundled JSONL journal implementation (`journal`)
//! - In-memory implementation for tests and store-less deployments
//!
//! Retention, transcoding, and serving of the files themselves are outside
//! the engine; it only reports what it produced.

mod journal;

pub use journal::JsonlRecordingStore;

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A completed recording as reported to the store.
#[derive(Debug, Clone)]
pub struct NewRecording {
    pub camera_id: String,
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// Measured wall-clock capture time, not the requested duration
    pub duration_secs: u64,
    pub triggered_by_motion: bool,
}

/// A recording attempt that produced no usable file.
#[derive(Debug, Clone)]
pub struct FailedRecording {
    pub camera_id: String,
    /// Machine-readable reason code (TIMEOUT, ENCODING_ERROR)
    pub reason: String,
    pub detail: String,
    pub triggered_by_motion: bool,
}

/// Sink for recording outcomes.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Persist a completed recording; returns the minted record id.
    async fn create_recording(&self, recording: NewRecording) -> Result<Uuid>;

    /// Persist a failed recording attempt so operators can re-trigger
    /// manually.
    async fn record_failure(&self, failure: FailedRecording) -> Result<()>;
}

/// Keeps every outcome in memory. Used by tests and by deployments that
/// only want the files on disk.
#[derive(Default)]
pub struct MemoryRecordingStore {
    recordings: Mutex<Vec<NewRecording>>,
    failures: Mutex<Vec<FailedRecording>>,
}

impl MemoryRecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recordings(&self) -> Vec<NewRecording> {
        self.recordings.lock().await.clone()
    }

    pub async fn failures(&self) -> Vec<FailedRecording> {
        self.failures.lock().await.clone()
    }
}

#[async_trait]
impl RecordingStore for MemoryRecordingStore {
    async fn create_recording(&self, recording: NewRecording) -> Result<Uuid> {
        self.recordings.lock().await.push(recording);
        Ok(Uuid::new_v4())
    }

    async fn record_failure(&self, failure: FailedRecording) -> Result<()> {
        self.failures.lock().await.push(failure);
        Ok(())
    }
}
