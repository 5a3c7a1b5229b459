//! The audio facade: single owner of devices, subscriptions and settings.
//!
//! All engine state lives in one [`EngineCore`] behind one lock. Control
//! calls and the I/O timing thread both go through it; frame consumers and
//! the settings store are always called after the lock is released.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use huddle_audio::{
    gain, AudioBackend, AudioError, AudioFrame, AudioResult, CaptureEngine, DeviceCatalog,
    PlaybackEngine, Sound, SourceId, VoiceState, FRAME_DURATION, SAMPLE_RATE,
};
use huddle_ipc::{
    clamp_volume, AudioDevice, AudioEvent, AudioMetrics, AudioSettings, DeviceKind,
    SettingChange, SettingsBounds, EVENT_CHANNEL_CAPACITY,
};

use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsCollector;
use crate::registry::{InputTransition, SubscriptionRegistry};
use crate::settings::SettingsStore;

/// Engine timing and format configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Period of the I/O timing loop.
    pub tick_period: Duration,

    /// Capture sample rate in Hz.
    pub capture_sample_rate: u32,

    /// Capture channel count.
    pub input_channels: u16,

    /// Capacity of each event subscriber's channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period: FRAME_DURATION,
            capture_sample_rate: SAMPLE_RATE,
            input_channels: 1,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Identifies a registered frame consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

/// Callback receiving every captured frame forwarded while voice is active.
pub type FrameConsumer = Arc<dyn Fn(&AudioFrame) + Send + Sync>;

/// Settings snapshot to write, tagged with its version.
type PendingSave = Option<(u64, AudioSettings)>;

struct EngineCore {
    settings: AudioSettings,
    bounds: SettingsBounds,
    version: u64,
    capture: CaptureEngine,
    playback: PlaybackEngine,
    registry: SubscriptionRegistry,
}

impl EngineCore {
    fn changed(&mut self) -> PendingSave {
        self.version += 1;
        Some((self.version, self.settings.clone()))
    }
}

struct Inner {
    core: Mutex<EngineCore>,
    catalog: DeviceCatalog,
    consumers: RwLock<Vec<(ConsumerId, FrameConsumer)>>,
    listeners: Mutex<Vec<Sender<AudioEvent>>>,
    store: Arc<dyn SettingsStore>,
    saved_version: Mutex<u64>,
    metrics: MetricsCollector,
    config: EngineConfig,
    next_consumer: AtomicU64,
}

impl Inner {
    fn emit(&self, event: AudioEvent) {
        self.listeners
            .lock()
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(event)) => {
                    if !matches!(event, AudioEvent::InputLevel(_)) {
                        warn!(?event, "Failed to send event: channel full");
                    }
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    /// Write a settings snapshot unless a newer one was already written.
    fn persist(&self, pending: PendingSave) {
        let Some((version, settings)) = pending else {
            return;
        };

        let mut saved = self.saved_version.lock();
        if version <= *saved {
            debug!(version, "Newer settings already saved");
            return;
        }

        match self.store.save(&settings) {
            Ok(()) => *saved = version,
            Err(e) => {
                warn!("Failed to save audio settings: {}", e);
                self.emit(AudioEvent::Error {
                    kind: None,
                    message: e.to_string(),
                });
            }
        }
    }

    fn open_input(&self, core: &mut EngineCore) -> AudioResult<()> {
        let name = core.settings.input_device.clone();
        match core.capture.open(&name, self.config.input_channels) {
            Ok(()) => {
                let opened = core.capture.device_name().unwrap_or(name.as_str());
                self.emit(AudioEvent::DeviceOpened {
                    kind: DeviceKind::Input,
                    name: opened.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to open input device: {}", e);
                self.emit(AudioEvent::Error {
                    kind: Some(DeviceKind::Input),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn close_input(&self, core: &mut EngineCore) {
        if core.capture.is_open() {
            core.capture.close();
            self.emit(AudioEvent::DeviceClosed {
                kind: DeviceKind::Input,
            });
        }
    }

    /// Open the output device unless it is open already.
    fn open_output(&self, core: &mut EngineCore) -> AudioResult<()> {
        if !core.settings.output_enabled {
            debug!("Output disabled, not opening device");
            return Err(AudioError::DeviceNotReady);
        }
        if core.playback.is_ready() {
            return Ok(());
        }

        let name = core.settings.output_device.clone();
        match core.playback.open(&name) {
            Ok(()) => {
                let opened = core.playback.device_name().unwrap_or(name.as_str());
                self.emit(AudioEvent::DeviceOpened {
                    kind: DeviceKind::Output,
                    name: opened.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to open output device: {}", e);
                self.emit(AudioEvent::Error {
                    kind: Some(DeviceKind::Output),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn close_output(&self, core: &mut EngineCore) {
        if core.playback.is_ready() {
            core.playback.close();
            self.emit(AudioEvent::DeviceClosed {
                kind: DeviceKind::Output,
            });
        }
    }

    /// Close the output once no peer is subscribed and no one-shot is playing.
    fn close_output_if_idle(&self, core: &mut EngineCore) {
        if core.playback.is_ready()
            && core.registry.output_subscribers() == 0
            && !core.playback.main_active()
        {
            debug!("Output idle, closing device");
            self.close_output(core);
        }
    }

    fn tick(&self, now: Instant) {
        let frames = {
            let mut core = self.core.lock();
            let subscribers = core.registry.input_subscribers();
            let tick = core.capture.tick(now, subscribers);

            if tick.processed() > 0 {
                self.metrics.record_capture(tick.frames.len(), tick.dropped);
            }
            if let Some(level) = tick.level {
                self.metrics.update_input_level(level);
                self.emit(AudioEvent::InputLevel(level));
            }
            if let Some(state) = tick.transition {
                self.emit(AudioEvent::VoiceActivity {
                    active: state == VoiceState::Active,
                });
            }
            if let Some(e) = tick.error {
                self.emit(AudioEvent::Error {
                    kind: Some(DeviceKind::Input),
                    message: e.to_string(),
                });
                self.emit(AudioEvent::DeviceClosed {
                    kind: DeviceKind::Input,
                });
            }

            core.playback.sweep();
            self.close_output_if_idle(&mut core);
            tick.frames
        };

        if frames.is_empty() {
            return;
        }

        let consumers: Vec<FrameConsumer> = self
            .consumers
            .read()
            .iter()
            .map(|(_, consumer)| Arc::clone(consumer))
            .collect();

        for frame in &frames {
            for consumer in &consumers {
                consumer(frame);
            }
        }
    }
}

/// The audio engine as seen by the call subsystem and the settings UI.
///
/// Every operation is safe to call from any thread. Share it with `Arc`.
pub struct AudioFacade {
    inner: Arc<Inner>,
    timing_thread: Mutex<Option<JoinHandle<()>>>,
    should_stop: Arc<AtomicBool>,
}

impl AudioFacade {
    /// Create an engine over `backend`, loading settings from `store`.
    ///
    /// No device is opened until something subscribes.
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        store: Arc<dyn SettingsStore>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let bounds = SettingsBounds::default();
        let settings = store.load()?.clamped(&bounds);
        let catalog = DeviceCatalog::new(backend);

        let capture = CaptureEngine::new(
            catalog.clone(),
            settings.input_gain_db,
            settings.input_threshold,
            Duration::from_millis(settings.voice_hold_ms as u64),
        )
        .with_sample_rate(config.capture_sample_rate);

        let mut playback = PlaybackEngine::new(catalog.clone());
        playback.set_volume(settings.output_volume);

        info!(
            backend = catalog.backend_name(),
            input = %settings.input_device,
            output = %settings.output_device,
            "Audio engine created"
        );

        let inner = Inner {
            core: Mutex::new(EngineCore {
                settings,
                bounds,
                version: 0,
                capture,
                playback,
                registry: SubscriptionRegistry::new(),
            }),
            catalog,
            consumers: RwLock::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            store,
            saved_version: Mutex::new(0),
            metrics: MetricsCollector::new(),
            config,
            next_consumer: AtomicU64::new(1),
        };

        Ok(Self {
            inner: Arc::new(inner),
            timing_thread: Mutex::new(None),
            should_stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the I/O timing thread. Does nothing if it is already running.
    #[instrument(name = "facade_start", skip(self))]
    pub fn start(&self) -> EngineResult<()> {
        let mut slot = self.timing_thread.lock();
        if slot.is_some() {
            debug!("Timing thread already running");
            return Ok(());
        }

        self.should_stop.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let should_stop = Arc::clone(&self.should_stop);

        let handle = thread::Builder::new()
            .name("huddle-audio-io".to_string())
            .spawn(move || timing_loop(inner, should_stop))
            .map_err(EngineError::Thread)?;

        *slot = Some(handle);
        info!(
            period_ms = self.inner.config.tick_period.as_millis() as u64,
            "Timing thread started"
        );
        Ok(())
    }

    /// Stop the I/O timing thread and wait for it to exit.
    #[instrument(name = "facade_stop", skip(self))]
    pub fn stop(&self) {
        let handle = self.timing_thread.lock().take();
        if let Some(handle) = handle {
            self.should_stop.store(true, Ordering::SeqCst);
            let _ = handle.join();
            info!("Timing thread stopped");
        }
    }

    /// Returns true while the timing thread runs.
    pub fn is_running(&self) -> bool {
        self.timing_thread.lock().is_some()
    }

    /// Run one I/O tick synchronously at `now`.
    pub fn tick_now(&self, now: Instant) {
        self.inner.tick(now);
    }

    // Subscriptions

    /// Take a reference on the capture device, opening it if it is closed.
    ///
    /// Reopening also retries a device closed by a hardware failure. While
    /// input is disabled the reference is counted but the device stays
    /// closed. If opening fails the reference is not taken.
    #[instrument(name = "subscribe_input", skip(self))]
    pub fn subscribe_input(&self) -> EngineResult<()> {
        let mut core = self.inner.core.lock();
        let transition = core.registry.subscribe_input();
        if core.settings.input_enabled && !core.capture.is_open() {
            if transition != InputTransition::Opened {
                info!("Capture device closed, retrying on subscribe");
            }
            if let Err(e) = self.inner.open_input(&mut core) {
                core.registry.unsubscribe_input();
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Release a reference on the capture device; the last one closes it.
    #[instrument(name = "unsubscribe_input", skip(self))]
    pub fn unsubscribe_input(&self) {
        let mut core = self.inner.core.lock();
        if core.registry.unsubscribe_input() == InputTransition::Closed {
            self.inner.close_input(&mut core);
        }
    }

    /// Create a playback source for one remote participant, opening the
    /// output device if needed.
    #[instrument(name = "subscribe_output", skip(self))]
    pub fn subscribe_output(&self) -> EngineResult<SourceId> {
        let mut core = self.inner.core.lock();
        self.inner.open_output(&mut core)?;

        let id = core.playback.create_peer_source()?;
        core.registry.track_output(id);
        debug!(%id, peers = core.registry.output_subscribers(), "Output subscribed");
        Ok(id)
    }

    /// Destroy a peer source. Unknown ids are ignored and return false.
    #[instrument(name = "unsubscribe_output", skip(self))]
    pub fn unsubscribe_output(&self, id: SourceId) -> bool {
        let mut core = self.inner.core.lock();
        if !core.registry.untrack_output(id) {
            debug!(%id, "Unsubscribing unknown output source");
            return false;
        }

        core.playback.destroy_peer_source(id);
        self.inner.close_output_if_idle(&mut core);
        true
    }

    // Call subsystem

    /// Queue PCM received from a peer.
    pub fn play_frames(
        &self,
        id: SourceId,
        pcm: &[i16],
        sample_count: usize,
        channels: u16,
        sample_rate: u32,
    ) -> EngineResult<()> {
        let mut core = self.inner.core.lock();
        if !core.registry.is_tracked(id) {
            return Err(AudioError::UnknownSource(id).into());
        }

        core.playback
            .play_frames(id, pcm, sample_count, channels, sample_rate)?;
        self.inner.metrics.record_buffer_queued();
        Ok(())
    }

    /// Register a callback for captured frames.
    ///
    /// Callbacks run on the timing thread (or the caller of
    /// [`tick_now`](Self::tick_now)) without the engine lock held.
    pub fn add_frame_consumer<F>(&self, consumer: F) -> ConsumerId
    where
        F: Fn(&AudioFrame) + Send + Sync + 'static,
    {
        let id = ConsumerId(self.inner.next_consumer.fetch_add(1, Ordering::Relaxed));
        self.inner.consumers.write().push((id, Arc::new(consumer)));
        id
    }

    /// Remove a frame consumer. Returns false for unknown ids.
    pub fn remove_frame_consumer(&self, id: ConsumerId) -> bool {
        let mut consumers = self.inner.consumers.write();
        let before = consumers.len();
        consumers.retain(|(existing, _)| *existing != id);
        consumers.len() != before
    }

    // Devices

    /// Capture devices, "System Default" first.
    pub fn input_devices(&self) -> Vec<AudioDevice> {
        self.inner.catalog.list_input_devices()
    }

    /// Playback devices, "System Default" first.
    pub fn output_devices(&self) -> Vec<AudioDevice> {
        self.inner.catalog.list_output_devices()
    }

    /// Saved capture device name.
    pub fn input_device(&self) -> String {
        self.inner.core.lock().settings.input_device.clone()
    }

    /// Saved playback device name.
    pub fn output_device(&self) -> String {
        self.inner.core.lock().settings.output_device.clone()
    }

    /// Switch capture to `name`.
    ///
    /// The device is closed and reopened only while someone is subscribed;
    /// otherwise only the saved name changes.
    #[instrument(name = "reinit_input", skip(self))]
    pub fn reinit_input(&self, name: &str) -> EngineResult<()> {
        let (result, pending) = {
            let mut core = self.inner.core.lock();
            core.settings.input_device = name.to_string();
            self.inner.emit(AudioEvent::SettingChanged(SettingChange::InputDevice(
                name.to_string(),
            )));

            let result = if core.registry.input_subscribers() > 0 && core.settings.input_enabled {
                self.inner.close_input(&mut core);
                self.inner.open_input(&mut core)
            } else {
                Ok(())
            };
            (result, core.changed())
        };

        self.inner.persist(pending);
        result.map_err(EngineError::from)
    }

    /// Switch playback to `name`.
    ///
    /// Peer sources survive the switch; audio still queued on them is dropped.
    #[instrument(name = "reinit_output", skip(self))]
    pub fn reinit_output(&self, name: &str) -> EngineResult<()> {
        let (result, pending) = {
            let mut core = self.inner.core.lock();
            core.settings.output_device = name.to_string();
            self.inner.emit(AudioEvent::SettingChanged(SettingChange::OutputDevice(
                name.to_string(),
            )));

            let result = if core.registry.output_subscribers() > 0 && core.settings.output_enabled
            {
                self.inner.close_output(&mut core);
                self.inner.open_output(&mut core)
            } else {
                Ok(())
            };
            (result, core.changed())
        };

        self.inner.persist(pending);
        result.map_err(EngineError::from)
    }

    /// Returns true if capture is enabled.
    pub fn input_enabled(&self) -> bool {
        self.inner.core.lock().settings.input_enabled
    }

    /// Enable or disable capture. Enabling with subscribers opens the device.
    pub fn set_input_enabled(&self, enabled: bool) -> EngineResult<()> {
        let (result, pending) = {
            let mut core = self.inner.core.lock();
            core.settings.input_enabled = enabled;
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::InputEnabled(enabled)));

            let result = if !enabled {
                self.inner.close_input(&mut core);
                Ok(())
            } else if core.registry.input_subscribers() > 0 && !core.capture.is_open() {
                self.inner.open_input(&mut core)
            } else {
                Ok(())
            };
            (result, core.changed())
        };

        self.inner.persist(pending);
        result.map_err(EngineError::from)
    }

    /// Returns true if playback is enabled.
    pub fn output_enabled(&self) -> bool {
        self.inner.core.lock().settings.output_enabled
    }

    /// Enable or disable playback. Peer sources stay registered while disabled.
    pub fn set_output_enabled(&self, enabled: bool) -> EngineResult<()> {
        let (result, pending) = {
            let mut core = self.inner.core.lock();
            core.settings.output_enabled = enabled;
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::OutputEnabled(enabled)));

            let result = if !enabled {
                self.inner.close_output(&mut core);
                Ok(())
            } else if core.registry.output_subscribers() > 0 {
                self.inner.open_output(&mut core)
            } else {
                Ok(())
            };
            (result, core.changed())
        };

        self.inner.persist(pending);
        result.map_err(EngineError::from)
    }

    // Ranged settings

    /// Input gain in dB.
    pub fn input_gain(&self) -> f32 {
        self.inner.core.lock().settings.input_gain_db
    }

    /// Set input gain in dB, clamped to the current bounds.
    pub fn set_input_gain(&self, db: f32) {
        let pending = {
            let mut core = self.inner.core.lock();
            let value = core.bounds.clamp_gain(db);
            core.settings.input_gain_db = value;
            core.capture.set_gain(value);
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::InputGain(value)));
            core.changed()
        };
        self.inner.persist(pending);
    }

    /// Voice activation threshold.
    pub fn input_threshold(&self) -> f32 {
        self.inner.core.lock().settings.input_threshold
    }

    /// Set the voice activation threshold, clamped to the current bounds.
    pub fn set_input_threshold(&self, threshold: f32) {
        let pending = {
            let mut core = self.inner.core.lock();
            let value = core.bounds.clamp_threshold(threshold);
            core.settings.input_threshold = value;
            core.capture.set_threshold(value);
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::InputThreshold(value)));
            core.changed()
        };
        self.inner.persist(pending);
    }

    /// Threshold as a [0, 1] position within its bounds.
    pub fn input_threshold_percent(&self) -> f32 {
        let core = self.inner.core.lock();
        gain::threshold_to_percent(
            core.settings.input_threshold,
            core.bounds.min_input_threshold,
            core.bounds.max_input_threshold,
        )
    }

    /// Set the threshold from a [0, 1] slider position.
    pub fn set_input_threshold_percent(&self, percent: f32) {
        let threshold = {
            let core = self.inner.core.lock();
            gain::percent_to_threshold(
                percent,
                core.bounds.min_input_threshold,
                core.bounds.max_input_threshold,
            )
        };
        self.set_input_threshold(threshold);
    }

    /// Voice hold in milliseconds.
    pub fn voice_hold(&self) -> u32 {
        self.inner.core.lock().settings.voice_hold_ms
    }

    /// Set voice hold in milliseconds, clamped to the current bounds.
    pub fn set_voice_hold(&self, ms: u32) {
        let pending = {
            let mut core = self.inner.core.lock();
            let value = core.bounds.clamp_voice_hold(ms);
            core.settings.voice_hold_ms = value;
            core.capture.set_hold(Duration::from_millis(value as u64));
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::VoiceHold(value)));
            core.changed()
        };
        self.inner.persist(pending);
    }

    /// Output volume (0.0 - 1.0).
    pub fn output_volume(&self) -> f32 {
        self.inner.core.lock().settings.output_volume
    }

    /// Set output volume, clamped to [0, 1].
    pub fn set_output_volume(&self, volume: f32) {
        let pending = {
            let mut core = self.inner.core.lock();
            let value = clamp_volume(volume);
            core.settings.output_volume = value;
            core.playback.set_volume(value);
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::OutputVolume(value)));
            core.changed()
        };
        self.inner.persist(pending);
    }

    // Bounds

    /// Current ranges of the ranged settings.
    pub fn bounds(&self) -> SettingsBounds {
        self.inner.core.lock().bounds
    }

    /// Set the lowest accepted input gain in dB.
    pub fn set_min_input_gain(&self, db: f32) {
        self.update_bounds(|b| b.min_input_gain_db = db);
    }

    /// Set the highest accepted input gain in dB.
    pub fn set_max_input_gain(&self, db: f32) {
        self.update_bounds(|b| b.max_input_gain_db = db);
    }

    /// Set the lowest accepted activation threshold.
    pub fn set_min_input_threshold(&self, threshold: f32) {
        self.update_bounds(|b| b.min_input_threshold = threshold);
    }

    /// Set the highest accepted activation threshold.
    pub fn set_max_input_threshold(&self, threshold: f32) {
        self.update_bounds(|b| b.max_input_threshold = threshold);
    }

    /// Set the shortest accepted voice hold in milliseconds.
    pub fn set_min_voice_hold(&self, ms: u32) {
        self.update_bounds(|b| b.min_voice_hold_ms = ms);
    }

    /// Set the longest accepted voice hold in milliseconds.
    pub fn set_max_voice_hold(&self, ms: u32) {
        self.update_bounds(|b| b.max_voice_hold_ms = ms);
    }

    /// Change a bound and re-clamp the values it governs.
    fn update_bounds(&self, update: impl FnOnce(&mut SettingsBounds)) {
        let pending = {
            let mut core = self.inner.core.lock();
            update(&mut core.bounds);
            let bounds = core.bounds;
            self.inner
                .emit(AudioEvent::SettingChanged(SettingChange::Bounds(bounds)));

            let mut changed = false;

            let gain = bounds.clamp_gain(core.settings.input_gain_db);
            if gain != core.settings.input_gain_db {
                core.settings.input_gain_db = gain;
                core.capture.set_gain(gain);
                self.inner
                    .emit(AudioEvent::SettingChanged(SettingChange::InputGain(gain)));
                changed = true;
            }

            let threshold = bounds.clamp_threshold(core.settings.input_threshold);
            if threshold != core.settings.input_threshold {
                core.settings.input_threshold = threshold;
                core.capture.set_threshold(threshold);
                self.inner.emit(AudioEvent::SettingChanged(
                    SettingChange::InputThreshold(threshold),
                ));
                changed = true;
            }

            let hold = bounds.clamp_voice_hold(core.settings.voice_hold_ms);
            if hold != core.settings.voice_hold_ms {
                core.settings.voice_hold_ms = hold;
                core.capture.set_hold(Duration::from_millis(hold as u64));
                self.inner
                    .emit(AudioEvent::SettingChanged(SettingChange::VoiceHold(hold)));
                changed = true;
            }

            if changed {
                core.changed()
            } else {
                None
            }
        };
        self.inner.persist(pending);
    }

    // One-shot sounds

    /// Play mono 16-bit little-endian PCM at 48 kHz on the notification
    /// source, replacing whatever it was playing.
    pub fn play_one_shot(&self, pcm: impl Into<Bytes>) -> EngineResult<()> {
        let sound = Sound::from_mono16(pcm)?;
        self.play_sound(&sound)
    }

    /// Load a WAV file and play it as a one-shot.
    pub fn play_one_shot_file(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        let sound = Sound::load_wav(path)?;
        self.play_sound(&sound)
    }

    /// Play a decoded clip as a one-shot.
    pub fn play_sound(&self, sound: &Sound) -> EngineResult<()> {
        let mut core = self.inner.core.lock();
        self.inner.open_output(&mut core)?;
        core.playback.play_one_shot(sound)?;
        self.inner.metrics.record_one_shot();
        Ok(())
    }

    /// Stop the one-shot currently playing.
    pub fn stop_active(&self) {
        let mut core = self.inner.core.lock();
        core.playback.stop_active();
        self.inner.close_output_if_idle(&mut core);
    }

    // Status

    /// Returns true while the output device is open.
    pub fn is_output_ready(&self) -> bool {
        self.inner.core.lock().playback.is_ready()
    }

    /// Returns true while the capture device is open.
    pub fn is_input_open(&self) -> bool {
        self.inner.core.lock().capture.is_open()
    }

    /// Returns true while captured audio is being forwarded.
    pub fn is_voice_active(&self) -> bool {
        self.inner.core.lock().capture.voice_state() == VoiceState::Active
    }

    /// Number of capture subscribers.
    pub fn input_subscribers(&self) -> u32 {
        self.inner.core.lock().registry.input_subscribers()
    }

    /// Number of live peer sources.
    pub fn output_subscribers(&self) -> usize {
        self.inner.core.lock().registry.output_subscribers()
    }

    /// Buffers still queued on a source; `SourceId::MAIN` is the one-shot source.
    pub fn queued_buffers(&self, id: SourceId) -> Option<usize> {
        self.inner.core.lock().playback.queued_buffers(id)
    }

    /// Snapshot of the persisted knobs.
    pub fn settings(&self) -> AudioSettings {
        self.inner.core.lock().settings.clone()
    }

    /// Counters since creation.
    pub fn metrics(&self) -> AudioMetrics {
        let stats = self.inner.core.lock().playback.stats();
        self.inner.metrics.snapshot(stats)
    }

    /// Receive engine events on a new bounded channel.
    pub fn subscribe_events(&self) -> Receiver<AudioEvent> {
        let (tx, rx) = crossbeam_channel::bounded(self.inner.config.event_capacity);
        self.inner.listeners.lock().push(tx);
        rx
    }

    /// Publish an event to every subscriber.
    pub(crate) fn emit(&self, event: AudioEvent) {
        self.inner.emit(event);
    }
}

impl Drop for AudioFacade {
    fn drop(&mut self) {
        self.stop();
    }
}

/// I/O timing loop.
fn timing_loop(inner: Arc<Inner>, should_stop: Arc<AtomicBool>) {
    debug!("Timing loop starting");
    let period = inner.config.tick_period;

    while !should_stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        inner.tick(tick_start);

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            thread::sleep(period - elapsed);
        }
    }

    debug!("Timing loop stopped");
}
