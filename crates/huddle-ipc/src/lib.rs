//! Typed UI<->audio engine messages for huddle.
//!
//! This crate defines the settings, command and event types shared between
//! the audio engine and its collaborators (settings UI, persistence, call
//! subsystem).

mod commands;
mod events;
mod types;

pub use commands::AudioCommand;
pub use events::{AudioEvent, SettingChange};
pub use types::{
    clamp_volume, AudioDevice, AudioMetrics, AudioSettings, DeviceKind, SettingsBounds,
    SYSTEM_DEFAULT_DEVICE,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (UI → engine).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (engine → UI).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<AudioCommand>, Receiver<AudioCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<AudioEvent>, Receiver<AudioEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
