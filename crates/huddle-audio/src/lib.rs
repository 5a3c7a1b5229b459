//! Audio devices, voice activity detection, capture and mixing.
//!
//! This crate provides the device-facing half of the huddle audio engine:
//! device enumeration and resolution behind the [`AudioBackend`] seam,
//! microphone capture gated by a [`VoiceActivityDetector`], and playback
//! of many peer streams plus one notification sound through a [`Mixer`].
//!
//! Hardware access goes through `cpal` when the `cpal` feature is enabled;
//! the in-process [`MemoryBackend`] is always available.

pub mod backend;
mod capture;
mod device;
mod error;
mod format;
pub mod gain;
mod mixer;
mod playback;
mod sound;
mod vad;

#[cfg(feature = "cpal")]
pub use backend::cpal::CpalBackend;
pub use backend::memory::{DeviceOp, MemoryBackend};
pub use capture::{AudioFrame, CaptureEngine, CaptureTick};
pub use device::{
    is_default_request, AudioBackend, DeviceCatalog, InputDevice, OutputDevice, RenderFn,
    StreamFormat,
};
pub use error::AudioError;
pub use format::convert;
pub use mixer::{Mixer, MixerStats, SourceId};
pub use playback::PlaybackEngine;
pub use sound::Sound;
pub use vad::{VoiceActivityDetector, VoiceState};

use std::time::Duration;

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Capture and mixing sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48000;

/// Default playback channel count.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Duration of one captured frame.
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Maximum buffers queued on one playback source before the oldest is dropped.
pub const MAX_QUEUED_BUFFERS: usize = 64;
