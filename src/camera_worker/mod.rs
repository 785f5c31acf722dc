//! CameraWorker - Per-Camera Detection Loop
//!
//! ## Responsibilities
//!
//! - Drive one camera end-to-end: connect, read frames, estimate motion,
//!   feed the state machine, launch recordings on triggers
//! - Bounded connect retry (3 attempts, 5 s fixed backoff); any successful
//!   open resets the budget
//! - Warm-up suppression after each (re)connect so exposure settling cannot
//!   fire a trigger
//! - Cooperative stop, observed at loop-iteration granularity
//!
//! Mid-stream read failures and end-of-stream close the source and go back
//! to the connect step; only open failures count against the retry budget.
//! On exhaustion the worker records the error on its handle and exits, so
//! `status()` keeps reflecting the failure. No error here ever touches
//! another camera's worker.

use crate::availability::AvailabilityTracker;
use crate::camera_registry::{CameraRecord, DetectionConfig};
use crate::error::{Error, Result};
use crate::frame_source::{FrameSource, FrameSourceFactory};
use crate::motion_estimator::MotionEstimator;
use crate::motion_state::{MotionStateMachine, MotionTrigger};
use crate::recording_launcher::{launch_and_report, RecordingJob, RecordingLauncher};
use crate::recording_store::RecordingStore;
use crate::worker_registry::WorkerHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Open attempts before the worker gives up
const CONNECT_ATTEMPTS: u32 = 3;

/// Fixed spacing between open attempts
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// One camera's detection-and-recording loop. Constructed by the registry,
/// consumed by `run()` inside a spawned task.
pub struct CameraWorker {
    camera: CameraRecord,
    config: DetectionConfig,
    handle: Arc<WorkerHandle>,
    sources: Arc<dyn FrameSourceFactory>,
    launcher: Arc<dyn RecordingLauncher>,
    store: Arc<dyn RecordingStore>,
    availability: Arc<AvailabilityTracker>,
}

impl CameraWorker {
    pub fn new(
        camera: CameraRecord,
        config: DetectionConfig,
        handle: Arc<WorkerHandle>,
        sources: Arc<dyn FrameSourceFactory>,
        launcher: Arc<dyn RecordingLauncher>,
        store: Arc<dyn RecordingStore>,
        availability: Arc<AvailabilityTracker>,
    ) -> Self {
        Self {
            camera,
            config,
            handle,
            sources,
            launcher,
            store,
            availability,
        }
    }

    pub async fn run(self) {
        tracing::info!(camera_id = %self.camera.camera_id, "camera worker started");
        match self.supervise().await {
            Ok(()) => {
                tracing::info!(camera_id = %self.camera.camera_id, "camera worker stopped");
            }
            Err(e) => {
                tracing::error!(camera_id = %self.camera.camera_id, error = %e, "camera worker terminated");
                self.handle.set_last_error(&e);
            }
        }
        self.handle.mark_stopped();
    }

    /// Connect/detect cycle until a stop request or retry exhaustion.
    async fn supervise(&self) -> Result<()> {
        let mut estimator = MotionEstimator::from_config(&self.config);
        let mut machine = MotionStateMachine::new(&self.config);
        while self.handle.is_running() {
            let Some(mut source) = self.connect().await? else {
                break; // stop arrived during the retry backoff
            };
            // fresh baseline after every (re)connect; cooldown state is
            // deliberately kept so a flapping stream cannot cause a storm
            estimator.reset();
            let warmup_until = Instant::now() + self.config.motion_start_delay();
            self.detect(source.as_mut(), &mut estimator, &mut machine, warmup_until)
                .await;
            source.close().await;
        }
        Ok(())
    }

    /// Bounded open retry. `Ok(None)` when a stop request arrived between
    /// attempts; `Err` after the budget is exhausted.
    async fn connect(&self) -> Result<Option<Box<dyn FrameSource>>> {
        let url = self.camera.effective_stream_url();
        let mut last_error = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            if !self.handle.is_running() {
                return Ok(None);
            }
            match self
                .sources
                .open(&self.camera.camera_id, &url, self.config.frame_rate)
                .await
            {
                Ok(source) => {
                    self.availability.update(&self.camera.camera_id, true).await;
                    tracing::debug!(camera_id = %self.camera.camera_id, attempt, "stream open");
                    return Ok(Some(source));
                }
                Err(e) => {
                    self.availability
                        .update(&self.camera.camera_id, false)
                        .await;
                    tracing::warn!(
                        camera_id = %self.camera.camera_id,
                        attempt,
                        max_attempts = CONNECT_ATTEMPTS,
                        error = %e,
                        "stream open failed"
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < CONNECT_ATTEMPTS {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }
        Err(Error::Connection(format!(
            "open failed after {} attempts: {}",
            CONNECT_ATTEMPTS, last_error
        )))
    }

    /// Frame loop on one open source. Returns on stop, end-of-stream, or a
    /// read failure; the caller decides whether to reconnect.
    async fn detect(
        &self,
        source: &mut dyn FrameSource,
        estimator: &mut MotionEstimator,
        machine: &mut MotionStateMachine,
        warmup_until: Instant,
    ) {
        loop {
            if !self.handle.is_running() {
                return;
            }
            match source.read_frame().await {
                Ok(Some(frame)) => {
                    let motion = estimator.observe(&frame);
                    let now = Instant::now();
                    if now < warmup_until {
                        // estimator keeps settling its baseline; the state
                        // machine sees nothing during warm-up
                        continue;
                    }
                    if let Some(trigger) = machine.observe(motion, now) {
                        self.on_trigger(trigger);
                    }
                }
                Ok(None) => {
                    tracing::info!(camera_id = %self.camera.camera_id, "stream ended, reconnecting");
                    return;
                }
                Err(e) => {
                    tracing::warn!(camera_id = %self.camera.camera_id, error = %e, "frame read failed, reconnecting");
                    return;
                }
            }
        }
    }

    /// Handle one trigger from the state machine. The recording runs in its
    /// own task so detection continues while the encoder works; the flag on
    /// the shared handle is what makes a second trigger a no-op.
    fn on_trigger(&self, trigger: MotionTrigger) {
        if !self.camera.recording_enabled {
            tracing::debug!(camera_id = %self.camera.camera_id, "motion confirmed but recording disabled");
            return;
        }
        if !self.handle.try_begin_recording() {
            tracing::debug!(camera_id = %self.camera.camera_id, "recording already active, trigger dropped");
            return;
        }
        tracing::info!(
            camera_id = %self.camera.camera_id,
            confirmed_after = ?trigger.at.duration_since(trigger.motion_started_at),
            "motion confirmed, starting recording"
        );
        let job = RecordingJob {
            camera_id: self.camera.camera_id.clone(),
            stream_url: self.camera.effective_stream_url(),
            duration_secs: self.config.recording_duration_secs,
            frame_rate: self.config.frame_rate,
            triggered_by_motion: true,
        };
        let launcher = Arc::clone(&self.launcher);
        let store = Arc::clone(&self.store);
        let handle = Arc::clone(&self.handle);
        tokio::spawn(async move {
            // outcome already logged and journaled inside launch_and_report
            let _ = launch_and_report(launcher.as_ref(), store.as_ref(), job).await;
            handle.end_recording();
        });
    }
}
