//! Error types for the audio module.

use thiserror::Error;

use crate::mixer::SourceId;

/// Errors that can occur during audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Named device absent and no fallback device of that kind exists.
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    /// Operation attempted before the device was opened.
    #[error("Audio device not ready")]
    DeviceNotReady,

    /// Stale or foreign playback source id.
    #[error("Unknown playback source: {0}")]
    UnknownSource(SourceId),

    /// The platform audio layer reported an error.
    #[error("Audio hardware failure: {0}")]
    HardwareFailure(String),

    /// PCM data or stream parameters could not be used.
    #[error("Audio format not supported: {0}")]
    FormatNotSupported(String),

    /// A sound clip could not be read.
    #[error("Failed to load sound: {0}")]
    SoundLoad(String),
}

impl AudioError {
    /// Wrap a platform error as a hardware failure.
    pub fn hardware(err: impl std::fmt::Display) -> Self {
        Self::HardwareFailure(err.to_string())
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        Self::SoundLoad(err.to_string())
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::DeviceNotAvailable => {
                Self::DeviceNotFound("device not available".to_string())
            }
            cpal::BuildStreamError::StreamConfigNotSupported => {
                Self::FormatNotSupported("stream configuration".to_string())
            }
            other => Self::hardware(other),
        }
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        Self::hardware(err)
    }
}

#[cfg(feature = "cpal")]
impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        Self::hardware(err)
    }
}
