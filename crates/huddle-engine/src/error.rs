//! Error types for the engine.

use thiserror::Error;

use huddle_audio::AudioError;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A device, source or sound operation failed.
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// The settings store could not be read or written.
    #[error("Settings storage failed: {0}")]
    Settings(String),

    /// The I/O timing thread could not be spawned.
    #[error("Failed to start audio thread: {0}")]
    Thread(#[source] std::io::Error),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Settings(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
