//! RecordingLauncher - Bounded External Capture
//!
//! ## Responsibilities
//!
//! - One bounded-duration invocation of the external encoder per job
//! - Output validation (exit status + file presence + minimum viable size)
//! - Partial-file cleanup on every failure path
//! - ffmpeg-backed implementation (`ffmpeg`)
//!
//! A launch owns its process handle and output path exclusively, so
//! concurrent recordings for different cameras never collide. Whether a
//! launch may start at all (one recording per camera) is the worker
//! registry's call, not the launcher's.

mod ffmpeg;

pub use ffmpeg::FfmpegRecordingLauncher;

use crate::error::Result;
use crate::recording_store::{FailedRecording, NewRecording, RecordingStore};
use async_trait::async_trait;
use std::path::PathBuf;

/// One bounded-duration capture request.
#[derive(Debug, Clone)]
pub struct RecordingJob {
    pub camera_id: String,
    /// Credential-bearing stream URL. Never logged; log the camera id.
    pub stream_url: String,
    pub duration_secs: u64,
    pub frame_rate: u32,
    /// Selects the output file prefix (`motion`/`manual`) and is passed
    /// through to the recording store
    pub triggered_by_motion: bool,
}

/// A capture that produced a usable file.
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    pub file_path: PathBuf,
    pub file_size_bytes: u64,
    /// Measured wall-clock capture time, not the requested duration
    pub actual_duration_secs: u64,
}

/// Runs external capture processes.
#[async_trait]
pub trait RecordingLauncher: Send + Sync {
    /// Run one capture to completion. `Err(Timeout)` when the process
    /// outlived `duration + grace`; `Err(Encoding)` on nonzero exit or
    /// missing/too-small output. Any partial file is already deleted when
    /// this returns an error.
    async fn launch(&self, job: &RecordingJob) -> Result<CompletedRecording>;
}

/// Run one job and report its outcome to the recording store. Shared by the
/// motion-trigger path and manual recordings; store write failures are
/// logged, never propagated, so a broken store cannot take a worker down.
pub async fn launch_and_report(
    launcher: &dyn RecordingLauncher,
    store: &dyn RecordingStore,
    job: RecordingJob,
) -> Result<CompletedRecording> {
    match launcher.launch(&job).await {
        Ok(done) => {
            tracing::info!(
                camera_id = %job.camera_id,
                file = %done.file_path.display(),
                size = done.file_size_bytes,
                duration = done.actual_duration_secs,
                "recording completed"
            );
            if let Err(e) = store
                .create_recording(NewRecording {
                    camera_id: job.camera_id.clone(),
                    file_path: done.file_path.clone(),
                    file_size_bytes: done.file_size_bytes,
                    duration_secs: done.actual_duration_secs,
                    triggered_by_motion: job.triggered_by_motion,
                })
                .await
            {
                tracing::error!(camera_id = %job.camera_id, error = %e, "recording store write failed");
            }
            Ok(done)
        }
        Err(e) => {
            tracing::warn!(camera_id = %job.camera_id, error = %e, "recording failed");
            if let Err(store_err) = store
                .record_failure(FailedRecording {
                    camera_id: job.camera_id.clone(),
                    reason: e.code().to_string(),
                    detail: e.to_string(),
                    triggered_by_motion: job.triggered_by_motion,
                })
                .await
            {
                tracing::error!(camera_id = %job.camera_id, error = %store_err, "recording store write failed");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::recording_store::MemoryRecordingStore;

    struct FixedLauncher {
        result: std::sync::Mutex<Option<Result<CompletedRecording>>>,
    }

    impl FixedLauncher {
        fn ok(path: &str, size: u64) -> Self {
            Self {
                result: std::sync::Mutex::new(Some(Ok(CompletedRecording {
                    file_path: PathBuf::from(path),
                    file_size_bytes: size,
                    actual_duration_secs: 30,
                }))),
            }
        }

        fn err(e: Error) -> Self {
            Self {
                result: std::sync::Mutex::new(Some(Err(e))),
            }
        }
    }

    #[async_trait]
    impl RecordingLauncher for FixedLauncher {
        async fn launch(&self, _job: &RecordingJob) -> Result<CompletedRecording> {
            self.result
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .take()
                .expect("launcher invoked once")
        }
    }

    fn job() -> RecordingJob {
        RecordingJob {
            camera_id: "cam-01".to_string(),
            stream_url: "rtsp://h/1".to_string(),
            duration_secs: 30,
            frame_rate: 15,
            triggered_by_motion: true,
        }
    }

    #[tokio::test]
    async fn success_lands_in_the_store() {
        let launcher = FixedLauncher::ok("/tmp/motion_x.mp4", 4096);
        let store = MemoryRecordingStore::new();
        let done = launch_and_report(&launcher, &store, job()).await.unwrap();
        assert_eq!(done.file_size_bytes, 4096);

        let recordings = store.recordings().await;
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].camera_id, "cam-01");
        assert!(recordings[0].triggered_by_motion);
        assert!(store.failures().await.is_empty());
    }

    #[tokio::test]
    async fn failure_is_journaled_with_its_reason_code() {
        let launcher = FixedLauncher::err(Error::Timeout("encoder exceeded 60s".to_string()));
        let store = MemoryRecordingStore::new();
        assert!(launch_and_report(&launcher, &store, job()).await.is_err());

        let failures = store.failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, "TIMEOUT");
        assert!(store.recordings().await.is_empty());
    }
}
