//! [`AudioBackend`](crate::AudioBackend) implementations.

#[cfg(feature = "cpal")]
pub mod cpal;
pub mod memory;
