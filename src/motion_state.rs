//! Motion State Machine
//!
//! Per-camera debounce and cooldown policy. Pure: no I/O, no internal
//! clock — every observation carries its own timestamp, so tests drive the
//! machine with a scripted sequence of booleans and fabricated times.
//!
//! ```text
//! Idle --motion--> Candidate --k consecutive--> Confirmed
//!                     |                            |
//!                  no motion                  gate open: emit trigger
//!                     v                            v
//!                   Idle                        Cooldown --expiry--> Idle
//! ```
//!
//! The trigger gate (time since the last trigger >= cooldown) is tracked
//! separately from the state: motion observed during Cooldown starts the
//! next run immediately, and a run that confirms while the gate is closed
//! parks in `Confirmed` until the gate opens or the motion expires. This is
//! what keeps recording storms impossible while still counting every frame.

use crate::camera_registry::DetectionConfig;
use std::time::{Duration, Instant};

/// Per-camera detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// No motion being tracked
    Idle,
    /// Motion observed, not yet enough consecutive frames
    Candidate,
    /// Enough consecutive frames; trigger emitted or suppressed by the gate
    Confirmed,
    /// A trigger just fired; quiet until the cooldown interval expires
    Cooldown,
}

/// Emitted when a recording should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionTrigger {
    /// First frame of the motion run that confirmed
    pub motion_started_at: Instant,
    /// Observation that fired the trigger
    pub at: Instant,
}

pub struct MotionStateMachine {
    min_consecutive_frames: u32,
    motion_timeout: Duration,
    cooldown: Duration,
    retrigger_on_sustained_motion: bool,

    state: MotionState,
    consecutive: u32,
    motion_started_at: Option<Instant>,
    last_motion_at: Option<Instant>,
    last_trigger_at: Option<Instant>,
    /// With sustained-motion re-triggering disabled, a no-motion frame must
    /// be seen between triggers
    armed: bool,
}

impl MotionStateMachine {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            min_consecutive_frames: config.min_consecutive_frames.max(1),
            motion_timeout: config.motion_timeout(),
            cooldown: config.cooldown(),
            retrigger_on_sustained_motion: config.retrigger_on_sustained_motion,
            state: MotionState::Idle,
            consecutive: 0,
            motion_started_at: None,
            last_motion_at: None,
            last_trigger_at: None,
            armed: true,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Feed one motion observation. Returns a trigger when a recording
    /// should start.
    pub fn observe(&mut self, motion: bool, now: Instant) -> Option<MotionTrigger> {
        if !motion {
            self.armed = true;
        }

        // Quiet cooldown ends at expiry; motion during cooldown starts the
        // next run right away (the gate, not the state, suppresses triggers).
        if self.state == MotionState::Cooldown && (motion || self.gate_open(now)) {
            self.reset_run();
            self.state = MotionState::Idle;
        }

        match self.state {
            MotionState::Idle => {
                if motion {
                    self.begin_run(now);
                    if self.consecutive >= self.min_consecutive_frames {
                        return self.confirm(now);
                    }
                }
                None
            }
            MotionState::Candidate => {
                if motion {
                    self.consecutive += 1;
                    self.last_motion_at = Some(now);
                    if self.consecutive >= self.min_consecutive_frames {
                        return self.confirm(now);
                    }
                } else {
                    self.reset_run();
                    self.state = MotionState::Idle;
                }
                None
            }
            MotionState::Confirmed => {
                if motion {
                    self.last_motion_at = Some(now);
                    if self.may_trigger(now) {
                        return Some(self.emit(now));
                    }
                    None
                } else {
                    // confirmed-but-vanished motion expires without an event
                    if let Some(last) = self.last_motion_at {
                        if now.duration_since(last) > self.motion_timeout {
                            self.reset_run();
                            self.state = MotionState::Idle;
                        }
                    }
                    None
                }
            }
            MotionState::Cooldown => None,
        }
    }

    fn begin_run(&mut self, now: Instant) {
        self.state = MotionState::Candidate;
        self.consecutive = 1;
        self.motion_started_at = Some(now);
        self.last_motion_at = Some(now);
    }

    fn reset_run(&mut self) {
        self.consecutive = 0;
        self.motion_started_at = None;
    }

    /// Reaching the consecutive-frame bar moves to Confirmed; the trigger
    /// itself still has to pass the gate.
    fn confirm(&mut self, now: Instant) -> Option<MotionTrigger> {
        self.state = MotionState::Confirmed;
        if self.may_trigger(now) {
            Some(self.emit(now))
        } else {
            None
        }
    }

    fn may_trigger(&self, now: Instant) -> bool {
        self.gate_open(now) && (self.retrigger_on_sustained_motion || self.armed)
    }

    fn gate_open(&self, now: Instant) -> bool {
        match self.last_trigger_at {
            Some(t) => now.duration_since(t) >= self.cooldown,
            None => true,
        }
    }

    fn emit(&mut self, now: Instant) -> MotionTrigger {
        self.last_trigger_at = Some(now);
        self.state = MotionState::Cooldown;
        self.armed = false;
        let motion_started_at = self.motion_started_at.unwrap_or(now);
        self.reset_run();
        MotionTrigger {
            motion_started_at,
            at: now,
        }
    }
}
