//! camsentry - per-camera motion detection and recording orchestration
//!
//! ## Components
//!
//! 1. CameraRegistry - fleet data collaborator (camera records + detection tuning)
//! 2. FrameSource - live stream frame acquisition (ffmpeg rawvideo pipe)
//! 3. MotionEstimator - frame-diff motion decision (blur/diff/threshold/dilate/regions)
//! 4. MotionStateMachine - per-camera debounce and cooldown policy (pure)
//! 5. RecordingLauncher - bounded external mp4 capture with output validation
//! 6. RecordingStore - recording outcome collaborator (JSONL journal bundled)
//! 7. CameraWorker - per-camera detect/decide/record loop with bounded retry
//! 8. WorkerRegistry - process-wide worker table and control surface
//!
//! ## Design principles
//!
//! - One worker per camera, one recording per camera, enforced by the
//!   registry's single worker table
//! - Collaborators behind traits; bundled file-backed implementations
//! - Retry policy lives in the camera worker and nowhere else
//! - The state machine and estimator are pure and unit-testable without I/O

pub mod availability;
pub mod camera_registry;
pub mod camera_worker;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod motion_estimator;
pub mod motion_state;
pub mod recording_launcher;
pub mod recording_store;
pub mod worker_registry;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use worker_registry::{RegistryStatus, WorkerRegistry};
