//! Audio engine coordination for huddle.
//!
//! This crate ties the device-facing pieces of `huddle-audio` together behind
//! a single [`AudioFacade`]: reference-counted subscriptions, the I/O timing
//! thread, settings persistence, events for the settings UI and a command
//! loop that applies [`AudioCommand`]s.

mod control;
mod error;
mod facade;
mod metrics;
mod registry;
mod settings;

pub use control::ControlLoop;
pub use error::{EngineError, EngineResult};
pub use facade::{AudioFacade, ConsumerId, EngineConfig, FrameConsumer};
pub use metrics::MetricsCollector;
pub use registry::{InputTransition, SubscriptionRegistry};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};

use std::sync::Arc;

use crossbeam_channel::Receiver;
use huddle_ipc::AudioCommand;

/// Create a control loop for `facade` reading from `command_rx`.
pub fn create_control_loop(
    facade: Arc<AudioFacade>,
    command_rx: Receiver<AudioCommand>,
) -> ControlLoop {
    ControlLoop::new(facade, command_rx)
}
