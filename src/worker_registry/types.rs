//! WorkerRegistry type definitions
//!
//! `WorkerHandle` is the only state shared between a camera's worker task,
//! its spawned recording task, and the registry. Running and recording are
//! lock-free flags; the recording flag's compare-and-swap is what enforces
//! one recording per camera.

use crate::availability::CameraAvailability;
use crate::error::Error;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Last error recorded on a worker, as surfaced by `status()`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerError {
    /// Machine-readable code (CONNECTION_ERROR, CONFIGURATION_ERROR, ...)
    pub code: String,
    pub message: String,
}

/// Shared per-camera handle. Created by the registry, held by the worker
/// task and any in-flight recording task.
pub struct WorkerHandle {
    camera_id: String,
    running: AtomicBool,
    recording: AtomicBool,
    last_error: Mutex<Option<WorkerError>>,
}

impl WorkerHandle {
    pub fn new(camera_id: &str) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            running: AtomicBool::new(true),
            recording: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    /// Handle with no worker behind it. Carries the recording flag for
    /// manual recordings on cameras that are not being monitored.
    pub fn detached(camera_id: &str) -> Self {
        let handle = Self::new(camera_id);
        handle.running.store(false, Ordering::SeqCst);
        handle
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cooperative stop; the worker loop observes it within one frame-read
    /// period (or at the next retry-backoff check).
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Worker loop exit, normal or fatal.
    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Re-arm a non-running handle for a fresh worker.
    pub fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.clear_last_error();
    }

    /// Atomically claim the camera's single recording slot. `false` means a
    /// recording is already active and the trigger must be dropped.
    pub fn try_begin_recording(&self) -> bool {
        self.recording
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn set_last_error(&self, error: &Error) {
        let mut last = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        *last = Some(WorkerError {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    pub fn clear_last_error(&self) {
        let mut last = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        *last = None;
    }

    pub fn last_error(&self) -> Option<WorkerError> {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

/// Per-camera line of the status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub camera_id: String,
    pub running: bool,
    pub recording: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<CameraAvailability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<WorkerError>,
}

/// Snapshot returned by `WorkerRegistry::status()`.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub running_workers: usize,
    pub recording_cameras: usize,
    /// Ids of cameras with a live worker
    pub monitored_cameras: Vec<String>,
    pub cameras: Vec<CameraStatus>,
}

/// Outcome of a bulk start/stop, applied independently per camera.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkSummary {
    pub applied: usize,
    pub skipped: usize,
    pub errors: Vec<BulkFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub camera_id: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_slot_is_exclusive() {
        let handle = WorkerHandle::new("cam-01");
        assert!(handle.try_begin_recording());
        assert!(!handle.try_begin_recording());
        handle.end_recording();
        assert!(handle.try_begin_recording());
    }

    #[test]
    fn detached_handles_start_stopped() {
        let handle = WorkerHandle::detached("cam-01");
        assert!(!handle.is_running());
        assert!(handle.try_begin_recording());
    }

    #[test]
    fn resume_clears_the_previous_error() {
        let handle = WorkerHandle::new("cam-01");
        handle.set_last_error(&Error::Connection("open failed".to_string()));
        handle.mark_stopped();
        assert_eq!(handle.last_error().unwrap().code, "CONNECTION_ERROR");
        handle.resume();
        assert!(handle.is_running());
        assert!(handle.last_error().is_none());
    }
}
