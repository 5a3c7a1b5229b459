//! Microphone capture gated by voice activity.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, trace};

use crate::device::{DeviceCatalog, InputDevice, StreamFormat};
use crate::error::AudioError;
use crate::gain::{apply_gain, db_to_factor, rms_volume};
use crate::vad::{VoiceActivityDetector, VoiceState};
use crate::{AudioResult, FRAME_DURATION, SAMPLE_RATE};

/// A captured PCM frame.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved 16-bit samples with input gain applied.
    pub samples: Vec<i16>,

    /// Channel count.
    pub channels: u16,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Tick time at which the frame was processed.
    pub captured_at: Instant,

    /// Monotonically increasing sequence number.
    pub sequence: u64,

    /// RMS level of the frame (0.0 - 1.0).
    pub volume: f32,
}

impl AudioFrame {
    /// Number of samples per channel.
    pub fn sample_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Result of one capture tick.
#[derive(Debug, Default)]
pub struct CaptureTick {
    /// Frames accepted by the voice activity detector.
    pub frames: Vec<AudioFrame>,

    /// Frames processed but dropped while muted.
    pub dropped: usize,

    /// Level of the last processed frame. Ticks that complete no frame
    /// repeat the previous level; `None` until the first frame after open.
    pub level: Option<f32>,

    /// Voice state after the last transition during this tick, if any.
    pub transition: Option<VoiceState>,

    /// Device failure; the device has been closed.
    pub error: Option<AudioError>,
}

impl CaptureTick {
    /// Total frames processed this tick.
    pub fn processed(&self) -> usize {
        self.frames.len() + self.dropped
    }
}

/// Owns the capture device and turns raw samples into gated frames.
pub struct CaptureEngine {
    catalog: DeviceCatalog,
    device: Option<Box<dyn InputDevice>>,
    device_name: String,
    channels: u16,
    sample_rate: u32,
    format: StreamFormat,
    gain_factor: f32,
    vad: VoiceActivityDetector,
    pending: Vec<i16>,
    read_buf: Vec<i16>,
    sequence: u64,
    last_level: Option<f32>,
}

impl CaptureEngine {
    /// Create a closed capture engine.
    pub fn new(catalog: DeviceCatalog, gain_db: f32, threshold: f32, hold: Duration) -> Self {
        Self {
            catalog,
            device: None,
            device_name: String::new(),
            channels: 1,
            sample_rate: SAMPLE_RATE,
            format: StreamFormat::new(SAMPLE_RATE, 1),
            gain_factor: db_to_factor(gain_db),
            vad: VoiceActivityDetector::new(threshold, hold),
            pending: Vec::new(),
            read_buf: Vec::new(),
            sequence: 0,
            last_level: None,
        }
    }

    /// Capture at `sample_rate` instead of [`SAMPLE_RATE`]; applies on the next open.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Open the capture device.
    ///
    /// No-op if already open on the same device with the same channel count.
    #[instrument(name = "capture_open", skip(self))]
    pub fn open(&mut self, device_name: &str, channels: u16) -> AudioResult<()> {
        if self.device.is_some() && self.device_name == device_name && self.channels == channels
        {
            debug!("Capture already open on requested device");
            return Ok(());
        }

        self.close();

        let requested = StreamFormat::new(self.sample_rate, channels.max(1));
        let device = self.catalog.resolve_input(device_name, requested)?;

        self.format = device.format();
        self.device_name = device_name.to_string();
        self.channels = channels;
        self.vad.reset();

        info!(
            device = device.name(),
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            "Capture opened"
        );
        self.device = Some(device);
        Ok(())
    }

    /// Release the capture device. Safe to call when closed.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            info!(device = device.name(), "Capture closed");
        }
        self.pending.clear();
        self.last_level = None;
        self.vad.reset();
    }

    /// Returns true while a device is open.
    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Name of the open device, if any.
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.name())
    }

    /// Format of the frames produced.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Set input gain in dB; applies from the next tick.
    pub fn set_gain(&mut self, db: f32) {
        self.gain_factor = db_to_factor(db);
    }

    /// Linear gain factor currently applied.
    pub fn gain_factor(&self) -> f32 {
        self.gain_factor
    }

    /// Set the activation threshold; applies from the next tick.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.vad.set_threshold(threshold);
    }

    /// Set the voice hold duration; applies from the next tick.
    pub fn set_hold(&mut self, hold: Duration) {
        self.vad.set_hold(hold);
    }

    /// Current voice activity state.
    pub fn voice_state(&self) -> VoiceState {
        self.vad.state()
    }

    /// Run one capture tick at `now`.
    ///
    /// With zero subscribers the captured samples are discarded without
    /// touching the voice activity detector.
    pub fn tick(&mut self, now: Instant, subscribers: u32) -> CaptureTick {
        let mut tick = CaptureTick::default();

        let Some(device) = self.device.as_mut() else {
            return tick;
        };

        self.read_buf.clear();
        let read = device.read_available(&mut self.read_buf);
        let read = match read {
            Ok(read) => read,
            Err(e) => {
                error!("Capture device failed: {}", e);
                self.close();
                tick.error = Some(e);
                return tick;
            }
        };

        if subscribers == 0 {
            if read > 0 {
                trace!(samples = read, "No capture subscribers, discarding samples");
            }
            self.pending.clear();
            return tick;
        }

        self.pending.extend_from_slice(&self.read_buf);

        let frame_len = self.format.samples_for(FRAME_DURATION).max(1);
        while self.pending.len() >= frame_len {
            let mut samples: Vec<i16> = self.pending.drain(..frame_len).collect();
            apply_gain(&mut samples, self.gain_factor);

            let volume = rms_volume(&samples);
            if let Some(state) = self.vad.update(volume, now) {
                tick.transition = Some(state);
            }
            self.last_level = Some(volume);

            let sequence = self.sequence;
            self.sequence += 1;

            if self.vad.is_active() {
                tick.frames.push(AudioFrame {
                    samples,
                    channels: self.format.channels,
                    sample_rate: self.format.sample_rate,
                    captured_at: now,
                    sequence,
                    volume,
                });
            } else {
                tick.dropped += 1;
            }
        }

        tick.level = self.last_level;
        tick
    }
}
