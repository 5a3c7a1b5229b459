//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use huddle_audio::MixerStats;
use huddle_ipc::AudioMetrics;

/// Collects capture and playback counters.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    frames_captured: AtomicU64,
    frames_forwarded: AtomicU64,
    frames_dropped: AtomicU64,
    buffers_queued: AtomicU64,
    one_shots_played: AtomicU64,
    input_level: RwLock<f32>,
}

impl MetricsCollector {
    /// Create a zeroed collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one capture tick.
    pub fn record_capture(&self, forwarded: usize, dropped: usize) {
        let forwarded = forwarded as u64;
        let dropped = dropped as u64;
        self.frames_captured
            .fetch_add(forwarded + dropped, Ordering::Relaxed);
        self.frames_forwarded.fetch_add(forwarded, Ordering::Relaxed);
        self.frames_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    /// Record a peer buffer queued for playback.
    pub fn record_buffer_queued(&self) {
        self.buffers_queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a one-shot sound started.
    pub fn record_one_shot(&self) {
        self.one_shots_played.fetch_add(1, Ordering::Relaxed);
    }

    /// Update the latest input level.
    pub fn update_input_level(&self, level: f32) {
        *self.input_level.write() = level.clamp(0.0, 1.0);
    }

    /// Get current metrics snapshot, merged with the mixer's counters.
    pub fn snapshot(&self, mixer: MixerStats) -> AudioMetrics {
        AudioMetrics {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            buffers_queued: self.buffers_queued.load(Ordering::Relaxed),
            buffers_played: mixer.buffers_played,
            one_shots_played: self.one_shots_played.load(Ordering::Relaxed),
            render_underruns: mixer.underruns,
            input_level: *self.input_level.read(),
        }
    }
}
