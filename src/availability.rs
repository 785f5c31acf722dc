//! Camera availability tracking
//!
//! Fed by worker connect results: open success marks a camera online, open
//! failure marks it offline. Only transitions are logged, so a camera that
//! stays down does not spam the log. The current map is folded into the
//! registry's status snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera connection availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// Camera is reachable and producing frames
    Online,
    /// Last connect attempt failed
    Offline,
}

/// Availability transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityEvent {
    /// Camera went offline (or its first connect attempt failed)
    Offline,
    /// Camera came back after being offline
    Recovered,
}

/// Per-camera availability detail for status snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct CameraAvailability {
    pub availability: Availability,
    /// Last successful stream open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// When the current availability was entered
    pub changed_at: DateTime<Utc>,
}

/// Tracks per-camera online/offline state and detects transitions.
#[derive(Default)]
pub struct AvailabilityTracker {
    cameras: RwLock<HashMap<String, CameraAvailability>>,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one connect result. Returns a transition event exactly once
    /// per flip; repeated results in the same state return `None`.
    pub async fn update(&self, camera_id: &str, online: bool) -> Option<AvailabilityEvent> {
        let now = Utc::now();
        let next = if online {
            Availability::Online
        } else {
            Availability::Offline
        };

        let mut cameras = self.cameras.write().await;
        let prev = cameras.get(camera_id).map(|c| c.availability);
        match cameras.get_mut(camera_id) {
            Some(entry) => {
                if entry.availability != next {
                    entry.availability = next;
                    entry.changed_at = now;
                }
                if online {
                    entry.last_seen = Some(now);
                }
            }
            None => {
                cameras.insert(
                    camera_id.to_string(),
                    CameraAvailability {
                        availability: next,
                        last_seen: online.then_some(now),
                        changed_at: now,
                    },
                );
            }
        }
        drop(cameras);

        match (prev, next) {
            (Some(Availability::Online), Availability::Offline) => {
                tracing::warn!(camera_id = %camera_id, "camera offline");
                Some(AvailabilityEvent::Offline)
            }
            // a camera that was never reachable is worth one event too
            (None, Availability::Offline) => {
                tracing::warn!(camera_id = %camera_id, "camera unreachable on first connect");
                Some(AvailabilityEvent::Offline)
            }
            (Some(Availability::Offline), Availability::Online) => {
                tracing::info!(camera_id = %camera_id, "camera recovered");
                Some(AvailabilityEvent::Recovered)
            }
            _ => None,
        }
    }

    pub async fn get(&self, camera_id: &str) -> Option<CameraAvailability> {
        self.cameras.read().await.get(camera_id).cloned()
    }

    /// Full availability map, keyed by camera id.
    pub async fn snapshot(&self) -> HashMap<String, CameraAvailability> {
        self.cameras.read().await.clone()
    }

    /// Drop a camera from tracking (worker stopped and removed).
    pub async fn remove(&self, camera_id: &str) {
        self.cameras.write().await.remove(camera_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_success_is_silent() {
        let tracker = AvailabilityTracker::new();
        assert!(tracker.update("cam1", true).await.is_none());
        let entry = tracker.get("cam1").await.unwrap();
        assert_eq!(entry.availability, Availability::Online);
        assert!(entry.last_seen.is_some());
    }

    #[tokio::test]
    async fn first_failure_emits_offline() {
        let tracker = AvailabilityTracker::new();
        assert_eq!(
            tracker.update("cam1", false).await,
            Some(AvailabilityEvent::Offline)
        );
        assert!(tracker.get("cam1").await.unwrap().last_seen.is_none());
    }

    #[tokio::test]
    async fn each_flip_emits_exactly_once() {
        let tracker = AvailabilityTracker::new();
        tracker.update("cam1", true).await;
        assert_eq!(
            tracker.update("cam1", false).await,
            Some(AvailabilityEvent::Offline)
        );
        assert!(tracker.update("cam1", false).await.is_none());
        assert_eq!(
            tracker.update("cam1", true).await,
            Some(AvailabilityEvent::Recovered)
        );
        assert!(tracker.update("cam1", true).await.is_none());
    }

    #[tokio::test]
    async fn last_seen_tracks_successes_only() {
        let tracker = AvailabilityTracker::new();
        tracker.update("cam1", true).await;
        let seen_1 = tracker.get("cam1").await.unwrap().last_seen.unwrap();
        tracker.update("cam1", false).await;
        // offline keeps the previous last_seen
        assert_eq!(tracker.get("cam1").await.unwrap().last_seen, Some(seen_1));
    }

    #[tokio::test]
    async fn remove_forgets_the_camera() {
        let tracker = AvailabilityTracker::new();
        tracker.update("cam1", true).await;
        tracker.remove("cam1").await;
        assert!(tracker.get("cam1").await.is_none());
        // a fresh failure after removal is a first observation again
        assert_eq!(
            tracker.update("cam1", false).await,
            Some(AvailabilityEvent::Offline)
        );
    }
}
