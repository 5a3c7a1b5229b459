//! Common types shared by the engine and its collaborators.

use serde::{Deserialize, Serialize};

/// Display name of the synthetic entry that selects the platform default device.
pub const SYSTEM_DEFAULT_DEVICE: &str = "System Default";

/// Direction of an audio device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Capture device (microphone).
    Input,

    /// Playback device (speakers, headset).
    Output,
}

impl DeviceKind {
    /// Returns a lowercase name for log messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An audio device as presented to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioDevice {
    /// Device name; also the identifier stored in settings.
    pub name: String,

    /// Direction of the device.
    pub kind: DeviceKind,

    /// Whether this entry selects the platform default device.
    pub is_default: bool,
}

impl AudioDevice {
    /// Create an entry for a named hardware device.
    pub fn new(name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_default: false,
        }
    }

    /// Create the synthetic "System Default" entry.
    pub fn system_default(kind: DeviceKind) -> Self {
        Self {
            name: SYSTEM_DEFAULT_DEVICE.to_string(),
            kind,
            is_default: true,
        }
    }
}

/// Persisted audio settings.
///
/// Supplied by the persistence collaborator at startup and written back after
/// every successful setter call on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Capture device name (empty or "System Default" for the default device).
    pub input_device: String,

    /// Playback device name (empty or "System Default" for the default device).
    pub output_device: String,

    /// Whether capture is enabled at all.
    pub input_enabled: bool,

    /// Whether playback is enabled at all.
    pub output_enabled: bool,

    /// Input gain in decibels.
    pub input_gain_db: f32,

    /// Voice activation threshold as a fraction of full scale.
    pub input_threshold: f32,

    /// Voice hold duration in milliseconds.
    pub voice_hold_ms: u32,

    /// Output volume as a fraction of the device maximum (0.0 - 1.0).
    pub output_volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            input_device: String::new(),
            output_device: String::new(),
            input_enabled: true,
            output_enabled: true,
            input_gain_db: 0.0,
            input_threshold: 0.0,
            voice_hold_ms: 250,
            output_volume: 1.0,
        }
    }
}

impl AudioSettings {
    /// Returns a copy with every ranged knob clamped into `bounds`.
    pub fn clamped(&self, bounds: &SettingsBounds) -> Self {
        Self {
            input_gain_db: bounds.clamp_gain(self.input_gain_db),
            input_threshold: bounds.clamp_threshold(self.input_threshold),
            voice_hold_ms: bounds.clamp_voice_hold(self.voice_hold_ms),
            output_volume: clamp_volume(self.output_volume),
            ..self.clone()
        }
    }
}

/// Declared ranges for the ranged input knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettingsBounds {
    /// Lowest accepted input gain in dB.
    pub min_input_gain_db: f32,

    /// Highest accepted input gain in dB.
    pub max_input_gain_db: f32,

    /// Lowest accepted activation threshold.
    pub min_input_threshold: f32,

    /// Highest accepted activation threshold.
    pub max_input_threshold: f32,

    /// Shortest accepted voice hold in milliseconds.
    pub min_voice_hold_ms: u32,

    /// Longest accepted voice hold in milliseconds.
    pub max_voice_hold_ms: u32,
}

impl Default for SettingsBounds {
    fn default() -> Self {
        Self {
            min_input_gain_db: -30.0,
            max_input_gain_db: 30.0,
            min_input_threshold: 0.0,
            max_input_threshold: 0.4,
            min_voice_hold_ms: 250,
            max_voice_hold_ms: 1000,
        }
    }
}

impl SettingsBounds {
    /// Clamp a gain value into `[min_input_gain_db, max_input_gain_db]`.
    pub fn clamp_gain(&self, db: f32) -> f32 {
        clamp_f32(db, self.min_input_gain_db, self.max_input_gain_db)
    }

    /// Clamp a threshold into `[min_input_threshold, max_input_threshold]`.
    pub fn clamp_threshold(&self, threshold: f32) -> f32 {
        clamp_f32(threshold, self.min_input_threshold, self.max_input_threshold)
    }

    /// Clamp a hold duration into `[min_voice_hold_ms, max_voice_hold_ms]`.
    pub fn clamp_voice_hold(&self, ms: u32) -> u32 {
        self.min_voice_hold_ms.max(self.max_voice_hold_ms.min(ms))
    }
}

/// Clamp an output volume into `[0, 1]`.
pub fn clamp_volume(volume: f32) -> f32 {
    clamp_f32(volume, 0.0, 1.0)
}

// Never panics on inverted bounds; NaN maps to `max`.
fn clamp_f32(value: f32, min: f32, max: f32) -> f32 {
    min.max(max.min(value))
}

/// Snapshot of engine counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMetrics {
    /// Captured frames processed while at least one subscriber was present.
    pub frames_captured: u64,

    /// Frames forwarded to frame consumers (voice active).
    pub frames_forwarded: u64,

    /// Frames dropped because the voice activity detector was muted.
    pub frames_dropped: u64,

    /// PCM buffers queued for peer playback.
    pub buffers_queued: u64,

    /// Playback buffers fully rendered and retired.
    pub buffers_played: u64,

    /// One-shot sounds started.
    pub one_shots_played: u64,

    /// Render periods in which an active source ran out of data.
    pub render_underruns: u64,

    /// Most recent input level (0.0 - 1.0).
    pub input_level: f32,
}
