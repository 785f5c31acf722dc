//! WorkerRegistry - Process-Wide Worker Table
//!
//! ## Responsibilities
//!
//! - Own the table of camera workers (one per camera, registry-enforced)
//! - Start/stop single cameras and the whole fleet; bulk operations apply
//!   independently per camera
//! - Status snapshots safe to take concurrently with starts and stops
//! - Manual recordings, sharing the per-camera recording slot with the
//!   motion path
//! - Graceful shutdown with a bounded join wait
//!
//! The worker table and the per-camera handles inside it are the only state
//! shared across cameras. A worker that exhausts its retries stays in the
//! table as a non-running entry carrying its last error, so `status()`
//! keeps reflecting the failure until the camera is restarted or stopped.

mod types;

pub use types::{BulkFailure, BulkSummary, CameraStatus, RegistryStatus, WorkerError, WorkerHandle};

use crate::availability::AvailabilityTracker;
use crate::camera_registry::{CameraRecord, CameraRegistry};
use crate::camera_worker::CameraWorker;
use crate::error::{Error, Result};
use crate::frame_source::FrameSourceFactory;
use crate::recording_launcher::{launch_and_report, CompletedRecording, RecordingJob, RecordingLauncher};
use crate::recording_store::RecordingStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Bound on the shutdown join wait; covers a frame read plus one retry
/// backoff with room to spare
const SHUTDOWN_WAIT: Duration = Duration::from_secs(15);

struct WorkerEntry {
    handle: Arc<WorkerHandle>,
    /// None for detached entries (manual recording on an unmonitored camera)
    task: Option<JoinHandle<()>>,
}

/// The engine's control surface: everything callers (CLI, management
/// endpoints) do goes through here.
pub struct WorkerRegistry {
    cameras: Arc<dyn CameraRegistry>,
    sources: Arc<dyn FrameSourceFactory>,
    launcher: Arc<dyn RecordingLauncher>,
    store: Arc<dyn RecordingStore>,
    availability: Arc<AvailabilityTracker>,
    workers: RwLock<HashMap<String, WorkerEntry>>,
}

impl WorkerRegistry {
    pub fn new(
        cameras: Arc<dyn CameraRegistry>,
        sources: Arc<dyn FrameSourceFactory>,
        launcher: Arc<dyn RecordingLauncher>,
        store: Arc<dyn RecordingStore>,
    ) -> Self {
        Self {
            cameras,
            sources,
            launcher,
            store,
            availability: Arc::new(AvailabilityTracker::new()),
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Start one camera's worker. `Ok(false)` when it is already running;
    /// unknown cameras, disabled detection, and invalid tuning fail fast
    /// with a configuration error.
    pub async fn start_worker(&self, camera_id: &str) -> Result<bool> {
        if self.is_running(camera_id).await {
            return Ok(false);
        }
        let camera = self.find_camera(camera_id).await?;
        self.start_camera(camera).await
    }

    /// Request a stop and drop the table entry. Fire-and-forget: the loop
    /// observes the flag within one frame-read period. Returns whether a
    /// worker existed.
    pub async fn stop_worker(&self, camera_id: &str) -> bool {
        let removed = self.workers.write().await.remove(camera_id);
        match removed {
            Some(entry) => {
                entry.handle.request_stop();
                self.availability.remove(camera_id).await;
                tracing::info!(camera_id = %camera_id, "worker stop requested");
                true
            }
            None => false,
        }
    }

    /// Start every detection-enabled camera. One camera's failure never
    /// blocks the others.
    pub async fn start_all(&self) -> BulkSummary {
        let mut summary = BulkSummary::default();
        let cameras = match self.cameras.active_cameras().await {
            Ok(cameras) => cameras,
            Err(e) => {
                tracing::error!(error = %e, "cannot list cameras");
                summary.errors.push(BulkFailure {
                    camera_id: "*".to_string(),
                    message: e.to_string(),
                });
                return summary;
            }
        };
        for camera in cameras {
            if !camera.detection_enabled {
                summary.skipped += 1;
                continue;
            }
            let camera_id = camera.camera_id.clone();
            if self.is_running(&camera_id).await {
                summary.skipped += 1;
                continue;
            }
            match self.start_camera(camera).await {
                Ok(true) => summary.applied += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(camera_id = %camera_id, error = %e, "worker start failed");
                    summary.errors.push(BulkFailure {
                        camera_id,
                        message: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            started = summary.applied,
            skipped = summary.skipped,
            errors = summary.errors.len(),
            "start_all complete"
        );
        summary
    }

    /// Stop every worker in the table.
    pub async fn stop_all(&self) -> BulkSummary {
        let mut summary = BulkSummary::default();
        let camera_ids: Vec<String> = self.workers.read().await.keys().cloned().collect();
        for camera_id in camera_ids {
            if self.stop_worker(&camera_id).await {
                summary.applied += 1;
            } else {
                summary.skipped += 1;
            }
        }
        tracing::info!(stopped = summary.applied, "stop_all complete");
        summary
    }

    /// Point-in-time snapshot. Safe to call concurrently with starts and
    /// stops; a worker observed mid-wind-down may still show as running for
    /// up to one frame period.
    pub async fn status(&self) -> RegistryStatus {
        let workers = self.workers.read().await;
        let availability = self.availability.snapshot().await;
        let mut cameras: Vec<CameraStatus> = workers
            .iter()
            .map(|(camera_id, entry)| CameraStatus {
                camera_id: camera_id.clone(),
                running: entry.handle.is_running(),
                recording: entry.handle.is_recording(),
                availability: availability.get(camera_id).cloned(),
                last_error: entry.handle.last_error(),
            })
            .collect();
        drop(workers);
        cameras.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        RegistryStatus {
            running_workers: cameras.iter().filter(|c| c.running).count(),
            recording_cameras: cameras.iter().filter(|c| c.recording).count(),
            monitored_cameras: cameras
                .iter()
                .filter(|c| c.running)
                .map(|c| c.camera_id.clone())
                .collect(),
            cameras,
        }
    }

    /// Operator-requested recording, independent of motion. Honors the same
    /// one-recording-per-camera slot; a busy camera is a conflict, not a
    /// queued duplicate. No worker needs to be running.
    pub async fn record_now(
        &self,
        camera_id: &str,
        duration_secs: Option<u64>,
    ) -> Result<CompletedRecording> {
        let camera = self.find_camera(camera_id).await?;
        if !camera.recording_enabled {
            return Err(Error::Configuration(format!(
                "recording disabled for camera: {}",
                camera_id
            )));
        }
        let config = self.cameras.detection_config(camera_id).await?;

        // the recording slot lives on the table's handle; an unmonitored
        // camera gets a detached one so the invariant holds either way
        let handle = {
            let mut workers = self.workers.write().await;
            let entry = workers
                .entry(camera_id.to_string())
                .or_insert_with(|| WorkerEntry {
                    handle: Arc::new(WorkerHandle::detached(camera_id)),
                    task: None,
                });
            Arc::clone(&entry.handle)
        };
        if !handle.try_begin_recording() {
            return Err(Error::Conflict(format!(
                "recording already active for camera: {}",
                camera_id
            )));
        }
        tracing::info!(camera_id = %camera_id, "manual recording requested");
        let job = RecordingJob {
            camera_id: camera_id.to_string(),
            stream_url: camera.effective_stream_url(),
            duration_secs: duration_secs.unwrap_or(config.recording_duration_secs),
            frame_rate: config.frame_rate,
            triggered_by_motion: false,
        };
        let result = launch_and_report(self.launcher.as_ref(), self.store.as_ref(), job).await;
        handle.end_recording();

        // a detached entry only existed to carry the slot; drop it unless a
        // worker started on this camera while the recording ran
        let mut workers = self.workers.write().await;
        if let Some(entry) = workers.get(camera_id) {
            if entry.task.is_none() && !entry.handle.is_running() {
                workers.remove(camera_id);
            }
        }
        result
    }

    /// Stop everything and wait (bounded) for the worker tasks to finish.
    pub async fn shutdown(&self) {
        let entries: Vec<WorkerEntry> = {
            let mut workers = self.workers.write().await;
            workers.drain().map(|(_, entry)| entry).collect()
        };
        for entry in &entries {
            entry.handle.request_stop();
        }
        let deadline = tokio::time::Instant::now() + SHUTDOWN_WAIT;
        for mut entry in entries {
            let Some(task) = entry.task.take() else {
                continue;
            };
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(camera_id = %entry.handle.camera_id(), error = %e, "worker task failed");
                }
                Err(_) => {
                    tracing::warn!(
                        camera_id = %entry.handle.camera_id(),
                        "worker did not stop within the shutdown wait"
                    );
                }
            }
        }
        tracing::info!("worker registry shut down");
    }

    async fn is_running(&self, camera_id: &str) -> bool {
        self.workers
            .read()
            .await
            .get(camera_id)
            .map(|entry| entry.handle.is_running())
            .unwrap_or(false)
    }

    async fn find_camera(&self, camera_id: &str) -> Result<CameraRecord> {
        self.cameras
            .active_cameras()
            .await?
            .into_iter()
            .find(|c| c.camera_id == camera_id)
            .ok_or_else(|| Error::Configuration(format!("unknown camera: {}", camera_id)))
    }

    async fn start_camera(&self, camera: CameraRecord) -> Result<bool> {
        if !camera.detection_enabled {
            return Err(Error::Configuration(format!(
                "detection disabled for camera: {}",
                camera.camera_id
            )));
        }
        let config = self.cameras.detection_config(&camera.camera_id).await?;
        config.validate()?;

        let mut workers = self.workers.write().await;
        let handle = match workers.get(&camera.camera_id) {
            Some(entry) => {
                if entry.handle.is_running() {
                    // lost the start race; the other caller's worker is up
                    return Ok(false);
                }
                // reuse the existing handle so an in-flight manual
                // recording's slot survives the restart
                let handle = Arc::clone(&entry.handle);
                handle.resume();
                handle
            }
            None => Arc::new(WorkerHandle::new(&camera.camera_id)),
        };
        let camera_id = camera.camera_id.clone();
        let worker = CameraWorker::new(
            camera,
            config,
            Arc::clone(&handle),
            Arc::clone(&self.sources),
            Arc::clone(&self.launcher),
            Arc::clone(&self.store),
            Arc::clone(&self.availability),
        );
        let task = tokio::spawn(worker.run());
        workers.insert(
            camera_id.clone(),
            WorkerEntry {
                handle,
                task: Some(task),
            },
        );
        tracing::info!(camera_id = %camera_id, "worker started");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_registry::{DetectionConfig, FileCameraRegistry};
    use crate::frame_source::{Frame, FrameSource};
    use crate::recording_store::MemoryRecordingStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Source that yields alternating flat frames forever.
    struct EndlessSource {
        tick: u64,
    }

    #[async_trait]
    impl FrameSource for EndlessSource {
        async fn read_frame(&mut self) -> Result<Option<Frame>> {
            // paced like a real stream; instant under paused test time
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.tick += 1;
            Ok(Some(Frame::filled(64, 48, if self.tick % 2 == 0 { 0 } else { 255 })))
        }

        async fn close(&mut self) {}
    }

    /// Factory that always succeeds (or always fails) and counts opens.
    struct FakeFactory {
        opens: AtomicU32,
        fail: bool,
    }

    impl FakeFactory {
        fn healthy() -> Self {
            Self {
                opens: AtomicU32::new(0),
                fail: false,
            }
        }

        fn broken() -> Self {
            Self {
                opens: AtomicU32::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl FrameSourceFactory for FakeFactory {
        async fn open(
            &self,
            _camera_id: &str,
            _stream_url: &str,
            _frame_rate: u32,
        ) -> Result<Box<dyn FrameSource>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Connection("connection refused".to_string()))
            } else {
                Ok(Box::new(EndlessSource { tick: 0 }))
            }
        }
    }

    struct NoopLauncher;

    #[async_trait]
    impl RecordingLauncher for NoopLauncher {
        async fn launch(&self, job: &RecordingJob) -> Result<CompletedRecording> {
            Ok(CompletedRecording {
                file_path: std::path::PathBuf::from(format!("/tmp/{}.mp4", job.camera_id)),
                file_size_bytes: 4096,
                actual_duration_secs: job.duration_secs,
            })
        }
    }

    fn record(camera_id: &str, detection: bool, recording: bool) -> CameraRecord {
        CameraRecord {
            camera_id: camera_id.to_string(),
            stream_url: format!("rtsp://host/{}", camera_id),
            username: None,
            password: None,
            detection_enabled: detection,
            recording_enabled: recording,
        }
    }

    fn registry_with(factory: FakeFactory, cameras: Vec<CameraRecord>) -> WorkerRegistry {
        let fleet = cameras
            .into_iter()
            .map(|c| {
                let config = DetectionConfig {
                    min_area: 50,
                    motion_start_delay_secs: 0,
                    // workers in these tests only monitor; triggering is
                    // covered by the camera_worker tests
                    min_consecutive_frames: 100_000,
                    ..DetectionConfig::default()
                };
                (c, config)
            })
            .collect();
        WorkerRegistry::new(
            Arc::new(FileCameraRegistry::from_records(fleet)),
            Arc::new(factory),
            Arc::new(NoopLauncher),
            Arc::new(MemoryRecordingStore::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_one_worker() {
        let registry = registry_with(FakeFactory::healthy(), vec![record("cam-01", true, true)]);
        assert!(registry.start_worker("cam-01").await.unwrap());
        assert!(!registry.start_worker("cam-01").await.unwrap());

        let status = registry.status().await;
        assert_eq!(status.running_workers, 1);
        assert_eq!(status.monitored_cameras, vec!["cam-01".to_string()]);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_camera_fails_fast() {
        let registry = registry_with(FakeFactory::healthy(), vec![]);
        let err = registry.start_worker("ghost").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(registry.status().await.running_workers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn detection_disabled_camera_never_starts() {
        let registry = registry_with(FakeFactory::healthy(), vec![record("cam-01", false, true)]);
        let err = registry.start_worker("cam-01").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn start_all_skips_disabled_and_running() {
        let registry = registry_with(
            FakeFactory::healthy(),
            vec![
                record("cam-01", true, true),
                record("cam-02", true, true),
                record("cam-03", false, true),
            ],
        );
        registry.start_worker("cam-01").await.unwrap();

        let summary = registry.start_all().await;
        assert_eq!(summary.applied, 1); // cam-02
        assert_eq!(summary.skipped, 2); // cam-01 running, cam-03 disabled
        assert!(summary.errors.is_empty());
        assert_eq!(registry.status().await.running_workers, 2);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_worker_removes_the_entry() {
        let registry = registry_with(FakeFactory::healthy(), vec![record("cam-01", true, true)]);
        registry.start_worker("cam-01").await.unwrap();
        assert!(registry.stop_worker("cam-01").await);
        assert!(!registry.stop_worker("cam-01").await);

        let status = registry.status().await;
        assert_eq!(status.running_workers, 0);
        assert!(status.cameras.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_a_visible_error() {
        let registry = registry_with(FakeFactory::broken(), vec![record("cam-01", true, true)]);
        registry.start_worker("cam-01").await.unwrap();

        // 3 attempts with 5s spacing; paused time fast-forwards the sleeps
        let mut waited = 0;
        while registry.status().await.running_workers > 0 && waited < 200 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            waited += 1;
        }
        let status = registry.status().await;
        assert_eq!(status.running_workers, 0);
        assert!(status.monitored_cameras.is_empty());
        // the entry stays as a tombstone carrying the error
        assert_eq!(status.cameras.len(), 1);
        let camera = &status.cameras[0];
        assert!(!camera.running);
        assert_eq!(camera.last_error.as_ref().unwrap().code, "CONNECTION_ERROR");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_failure_reuses_the_entry() {
        let registry = registry_with(FakeFactory::broken(), vec![record("cam-01", true, true)]);
        registry.start_worker("cam-01").await.unwrap();
        let mut waited = 0;
        while registry.status().await.running_workers > 0 && waited < 200 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            waited += 1;
        }

        // a fresh start replaces the tombstone and clears the error
        assert!(registry.start_worker("cam-01").await.unwrap());
        let status = registry.status().await;
        assert_eq!(status.cameras.len(), 1);
        assert!(status.cameras[0].running);
        assert!(status.cameras[0].last_error.is_none());
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_recording_honors_the_recording_slot() {
        let registry = registry_with(FakeFactory::healthy(), vec![record("cam-01", true, true)]);
        registry.start_worker("cam-01").await.unwrap();

        // hold the worker's slot by hand and verify the conflict path
        let handle = {
            let workers = registry.workers.read().await;
            Arc::clone(&workers.get("cam-01").unwrap().handle)
        };
        assert!(handle.try_begin_recording());
        let err = registry.record_now("cam-01", None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // slot released: the manual recording goes through
        handle.end_recording();
        let done = registry.record_now("cam-01", Some(10)).await.unwrap();
        assert_eq!(done.file_size_bytes, 4096);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_recording_leaves_no_table_entry() {
        let registry = registry_with(FakeFactory::healthy(), vec![record("cam-01", true, true)]);
        // no worker: a detached handle carries the slot for the duration
        let done = registry.record_now("cam-01", Some(10)).await.unwrap();
        assert_eq!(done.file_size_bytes, 4096);

        // and is gone again afterwards, so status() only lists monitored
        // or failed cameras
        let status = registry.status().await;
        assert!(status.cameras.is_empty());
        assert_eq!(status.running_workers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_recording_requires_recording_enabled() {
        let registry = registry_with(FakeFactory::healthy(), vec![record("cam-01", true, false)]);
        let err = registry.record_now("cam-01", None).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_joins_all_workers() {
        let registry = registry_with(
            FakeFactory::healthy(),
            vec![record("cam-01", true, true), record("cam-02", true, true)],
        );
        registry.start_all().await;
        assert_eq!(registry.status().await.running_workers, 2);

        registry.shutdown().await;
        let status = registry.status().await;
        assert_eq!(status.running_workers, 0);
        assert!(status.cameras.is_empty());
    }
}
