//! Commands sent from the UI to the audio engine.

use serde::{Deserialize, Serialize};

/// Commands that the settings UI can send to the engine's control loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AudioCommand {
    /// Take a reference on the capture device (e.g. settings page shown).
    SubscribeInput,

    /// Release a reference on the capture device.
    UnsubscribeInput,

    /// Set input gain in dB (clamped).
    SetInputGain(f32),

    /// Set voice activation threshold (clamped).
    SetInputThreshold(f32),

    /// Set voice hold in milliseconds (clamped).
    SetVoiceHold(u32),

    /// Set output volume (0.0 - 1.0, clamped).
    SetOutputVolume(f32),

    /// Enable or disable the capture device.
    SetInputEnabled(bool),

    /// Enable or disable the playback device.
    SetOutputEnabled(bool),

    /// Switch to another capture device.
    ReinitInput(String),

    /// Switch to another playback device.
    ReinitOutput(String),

    /// Play a mono 16-bit little-endian 48 kHz clip on the notification source.
    PlayOneShot(Vec<u8>),

    /// Stop the notification source.
    StopActive,

    /// Request the list of available audio devices.
    GetDevices,

    /// Request a metrics snapshot.
    GetMetrics,

    /// Stop the control loop.
    Shutdown,
}
