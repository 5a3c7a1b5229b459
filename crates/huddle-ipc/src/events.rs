//! Events sent from the audio engine to the UI.

use serde::{Deserialize, Serialize};

use crate::types::{AudioDevice, AudioMetrics, DeviceKind, SettingsBounds};

/// Events that the engine can send to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AudioEvent {
    /// Current input level (0.0 - 1.0), published every capture tick
    /// regardless of voice activity.
    InputLevel(f32),

    /// Voice activity detector changed state.
    VoiceActivity {
        /// Whether captured audio is currently forwarded.
        active: bool,
    },

    /// A user-visible setting was changed.
    SettingChanged(SettingChange),

    /// A device was opened.
    DeviceOpened {
        /// Direction of the device.
        kind: DeviceKind,

        /// Name of the device actually opened.
        name: String,
    },

    /// A device was closed.
    DeviceClosed {
        /// Direction of the device.
        kind: DeviceKind,
    },

    /// List of available audio devices.
    Devices {
        /// Capture devices, "System Default" first.
        inputs: Vec<AudioDevice>,

        /// Playback devices, "System Default" first.
        outputs: Vec<AudioDevice>,
    },

    /// Metrics snapshot.
    Metrics(AudioMetrics),

    /// Error occurred.
    Error {
        /// Device the error relates to, if any.
        kind: Option<DeviceKind>,

        /// Error message.
        message: String,
    },
}

/// A setting value after clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettingChange {
    /// Input gain in dB.
    InputGain(f32),

    /// Voice activation threshold.
    InputThreshold(f32),

    /// Voice hold in milliseconds.
    VoiceHold(u32),

    /// Output volume (0.0 - 1.0).
    OutputVolume(f32),

    /// Saved capture device name.
    InputDevice(String),

    /// Saved playback device name.
    OutputDevice(String),

    /// Capture enabled flag.
    InputEnabled(bool),

    /// Playback enabled flag.
    OutputEnabled(bool),

    /// New ranges for gain, threshold and hold.
    Bounds(SettingsBounds),
}
