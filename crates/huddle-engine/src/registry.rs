//! Reference counting of capture and playback subscribers.

use std::collections::HashSet;

use tracing::{debug, warn};

use huddle_audio::SourceId;

/// Effect of a subscription change on the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTransition {
    /// First subscriber arrived; the device should be opened.
    Opened,

    /// Last subscriber left; the device should be closed.
    Closed,

    /// Device state is unaffected.
    Unchanged,
}

/// Tracks who needs the capture device and which peer sources are live.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    input_count: u32,
    outputs: HashSet<SourceId>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference on the capture device.
    pub fn subscribe_input(&mut self) -> InputTransition {
        self.input_count = self.input_count.saturating_add(1);
        debug!(subscribers = self.input_count, "Input subscribed");

        if self.input_count == 1 {
            InputTransition::Opened
        } else {
            InputTransition::Unchanged
        }
    }

    /// Release a reference on the capture device.
    ///
    /// Releasing with no subscribers is logged and ignored.
    pub fn unsubscribe_input(&mut self) -> InputTransition {
        if self.input_count == 0 {
            warn!("Input unsubscribed without a matching subscribe");
            return InputTransition::Unchanged;
        }

        self.input_count -= 1;
        debug!(subscribers = self.input_count, "Input unsubscribed");

        if self.input_count == 0 {
            InputTransition::Closed
        } else {
            InputTransition::Unchanged
        }
    }

    /// Number of capture subscribers.
    pub fn input_subscribers(&self) -> u32 {
        self.input_count
    }

    /// Record a live peer source. Returns false if it was already tracked.
    pub fn track_output(&mut self, id: SourceId) -> bool {
        self.outputs.insert(id)
    }

    /// Forget a peer source. Returns false for unknown ids.
    pub fn untrack_output(&mut self, id: SourceId) -> bool {
        self.outputs.remove(&id)
    }

    /// Returns true if `id` is a live peer source.
    pub fn is_tracked(&self, id: SourceId) -> bool {
        self.outputs.contains(&id)
    }

    /// Number of live peer sources.
    pub fn output_subscribers(&self) -> usize {
        self.outputs.len()
    }
}
