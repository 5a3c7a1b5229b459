//! Voice activity detection with hold-time hysteresis.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Whether captured audio is currently considered speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceState {
    /// Below threshold and the hold window has elapsed; frames are dropped.
    Muted,

    /// Speech detected or still inside the hold window; frames are forwarded.
    Active,
}

#[derive(Debug, Clone, Copy)]
enum DetectorState {
    Muted,
    Active { deadline: Instant },
}

/// Threshold detector that keeps the stream open for `hold` after the level
/// last reached the threshold.
///
/// Transitions are evaluated once per [`update`](Self::update) call using
/// the supplied time, so the detector is driven entirely by the capture tick.
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    state: DetectorState,
    threshold: f32,
    hold: Duration,
}

impl VoiceActivityDetector {
    /// Create a muted detector.
    pub fn new(threshold: f32, hold: Duration) -> Self {
        Self {
            state: DetectorState::Muted,
            threshold,
            hold,
        }
    }

    /// Feed one volume sample taken at `now`.
    ///
    /// Returns the new state if this sample caused a transition.
    pub fn update(&mut self, volume: f32, now: Instant) -> Option<VoiceState> {
        let loud = volume >= self.threshold;

        match self.state {
            DetectorState::Muted if loud => {
                self.state = DetectorState::Active {
                    deadline: now + self.hold,
                };
                trace!(volume, "Voice activity started");
                Some(VoiceState::Active)
            }
            DetectorState::Muted => None,
            DetectorState::Active { .. } if loud => {
                self.state = DetectorState::Active {
                    deadline: now + self.hold,
                };
                None
            }
            DetectorState::Active { deadline } if now >= deadline => {
                self.state = DetectorState::Muted;
                trace!(volume, "Voice activity ended");
                Some(VoiceState::Muted)
            }
            DetectorState::Active { .. } => None,
        }
    }

    /// Current state.
    pub fn state(&self) -> VoiceState {
        match self.state {
            DetectorState::Muted => VoiceState::Muted,
            DetectorState::Active { .. } => VoiceState::Active,
        }
    }

    /// Returns true while frames should be forwarded.
    pub fn is_active(&self) -> bool {
        matches!(self.state, DetectorState::Active { .. })
    }

    /// Hold deadline, only present while active.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            DetectorState::Muted => None,
            DetectorState::Active { deadline } => Some(deadline),
        }
    }

    /// Return to the muted state.
    pub fn reset(&mut self) {
        self.state = DetectorState::Muted;
    }

    /// Activation threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set the activation threshold; takes effect on the next update.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Hold duration.
    pub fn hold(&self) -> Duration {
        self.hold
    }

    /// Set the hold duration; applies from the next time the level reaches
    /// the threshold.
    pub fn set_hold(&mut self, hold: Duration) {
        self.hold = hold;
    }
}
