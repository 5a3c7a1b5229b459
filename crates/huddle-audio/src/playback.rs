//! Output device ownership and playback of peer streams and one-shot sounds.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::device::{DeviceCatalog, OutputDevice, RenderFn, StreamFormat};
use crate::error::AudioError;
use crate::mixer::{Mixer, MixerStats, SourceId};
use crate::sound::Sound;
use crate::{AudioResult, OUTPUT_CHANNELS, SAMPLE_RATE};

/// Owns the playback device and the mixer it pulls from.
///
/// The mixer sits behind its own lock so the device callback never waits on
/// whoever owns the engine.
pub struct PlaybackEngine {
    catalog: DeviceCatalog,
    mixer: Arc<Mutex<Mixer>>,
    device: Option<Box<dyn OutputDevice>>,
    device_name: String,
    requested: StreamFormat,
}

impl PlaybackEngine {
    /// Create a closed playback engine.
    pub fn new(catalog: DeviceCatalog) -> Self {
        let requested = StreamFormat::new(SAMPLE_RATE, OUTPUT_CHANNELS);
        Self {
            catalog,
            mixer: Arc::new(Mutex::new(Mixer::new(requested))),
            device: None,
            device_name: String::new(),
            requested,
        }
    }

    /// Open the playback device.
    ///
    /// Re-opening on another device keeps every peer source but drops
    /// whatever audio was still queued.
    #[instrument(name = "playback_open", skip(self))]
    pub fn open(&mut self, device_name: &str) -> AudioResult<()> {
        if self.device.is_some() && self.device_name == device_name {
            debug!("Playback already open on requested device");
            return Ok(());
        }

        self.close();

        let device = self
            .catalog
            .resolve_output(device_name, self.requested, self.render_fn())?;

        let format = device.format();
        {
            let mut mixer = self.mixer.lock();
            mixer.set_format(format);
            mixer.clear_all();
        }
        self.device_name = device_name.to_string();

        info!(
            device = device.name(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Playback opened"
        );
        self.device = Some(device);
        Ok(())
    }

    fn render_fn(&self) -> RenderFn {
        let mixer = Arc::clone(&self.mixer);
        Arc::new(move |out: &mut [i16]| match mixer.try_lock() {
            Some(mut mixer) => mixer.render(out),
            // Never block the device thread.
            None => out.fill(0),
        })
    }

    /// Stop all sources and release the device. Sources stay registered.
    pub fn close(&mut self) {
        // The device may join its stream thread, which takes the mixer lock.
        if let Some(device) = self.device.take() {
            info!(device = device.name(), "Playback closed");
            drop(device);
        }
        self.mixer.lock().clear_all();
    }

    /// Returns true while a device is open.
    pub fn is_ready(&self) -> bool {
        self.device.is_some()
    }

    /// Name of the open device, if any.
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.name())
    }

    /// Format audio is mixed into.
    pub fn format(&self) -> StreamFormat {
        self.mixer.lock().format()
    }

    /// Allocate a playback source for one remote participant.
    pub fn create_peer_source(&mut self) -> AudioResult<SourceId> {
        if !self.is_ready() {
            return Err(AudioError::DeviceNotReady);
        }
        let id = self.mixer.lock().create_source();
        debug!(%id, "Peer source created");
        Ok(id)
    }

    /// Release a peer source. Returns false if it was already gone.
    pub fn destroy_peer_source(&mut self, id: SourceId) -> bool {
        let destroyed = self.mixer.lock().destroy_source(id);
        if destroyed {
            debug!(%id, "Peer source destroyed");
        }
        destroyed
    }

    /// Returns true if `id` names a live source.
    pub fn has_source(&self, id: SourceId) -> bool {
        self.mixer.lock().contains(id)
    }

    /// Number of live peer sources.
    pub fn peer_count(&self) -> usize {
        self.mixer.lock().peer_count()
    }

    /// Queue `sample_count` frames of interleaved PCM on a peer source.
    ///
    /// Rate and channel count may change from one call to the next; the
    /// audio is converted to the device format.
    pub fn play_frames(
        &mut self,
        id: SourceId,
        pcm: &[i16],
        sample_count: usize,
        channels: u16,
        sample_rate: u32,
    ) -> AudioResult<()> {
        let mut mixer = self.mixer.lock();
        if id.is_main() || !mixer.contains(id) {
            return Err(AudioError::UnknownSource(id));
        }
        if self.device.is_none() {
            return Err(AudioError::DeviceNotReady);
        }

        let needed = sample_count * channels as usize;
        if pcm.len() < needed {
            return Err(AudioError::FormatNotSupported(format!(
                "{} samples supplied for {} frames of {} channels",
                pcm.len(),
                sample_count,
                channels
            )));
        }

        mixer.enqueue(id, &pcm[..needed], StreamFormat::new(sample_rate, channels))
    }

    /// Play a clip on the main source, replacing whatever was queued there.
    pub fn play_one_shot(&mut self, sound: &Sound) -> AudioResult<()> {
        if !self.is_ready() {
            return Err(AudioError::DeviceNotReady);
        }
        self.mixer
            .lock()
            .replace(SourceId::MAIN, &sound.samples(), sound.format())?;
        debug!(duration = ?sound.duration(), "One-shot queued");
        Ok(())
    }

    /// Load a WAV clip and play it as a one-shot.
    pub fn play_one_shot_file(&mut self, path: impl AsRef<Path>) -> AudioResult<()> {
        let sound = Sound::load_wav(path)?;
        self.play_one_shot(&sound)
    }

    /// Silence the main source.
    pub fn stop_active(&mut self) {
        self.mixer.lock().clear(SourceId::MAIN);
    }

    /// Returns true while a one-shot is still playing.
    pub fn main_active(&self) -> bool {
        self.mixer.lock().is_active(SourceId::MAIN)
    }

    /// Output volume (0.0 - 1.0).
    pub fn volume(&self) -> f32 {
        self.mixer.lock().volume()
    }

    /// Set output volume, clamped to [0, 1].
    pub fn set_volume(&mut self, volume: f32) {
        if !(0.0..=1.0).contains(&volume) {
            warn!(volume, "Output volume out of range, clamping");
        }
        self.mixer.lock().set_volume(volume);
    }

    /// Buffers still queued on a source.
    pub fn queued_buffers(&self, id: SourceId) -> Option<usize> {
        self.mixer.lock().queued_buffers(id)
    }

    /// Retire played buffers; returns how many were retired.
    pub fn sweep(&mut self) -> usize {
        self.mixer.lock().sweep()
    }

    /// Mixer counters.
    pub fn stats(&self) -> MixerStats {
        self.mixer.lock().stats()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{DeviceOp, MemoryBackend};

    fn engine(backend: &MemoryBackend) -> PlaybackEngine {
        PlaybackEngine::new(DeviceCatalog::new(Arc::new(backend.clone())))
    }

    #[test]
    fn test_sources_require_open_device() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);

        assert!(matches!(
            playback.create_peer_source(),
            Err(AudioError::DeviceNotReady)
        ));

        playback.open("Speakers").unwrap();
        assert!(playback.is_ready());
        assert!(playback.create_peer_source().is_ok());
    }

    #[test]
    fn test_open_same_device_is_noop() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);

        playback.open("Speakers").unwrap();
        playback.open("Speakers").unwrap();
        assert_eq!(
            backend.operations(),
            [DeviceOp::OpenOutput("Speakers".to_string())]
        );
    }

    #[test]
    fn test_reopen_keeps_sources_and_drops_queued_audio() {
        let backend = MemoryBackend::new()
            .with_output("Speakers")
            .with_output("Headphones");
        let mut playback = engine(&backend);

        playback.open("Speakers").unwrap();
        let id = playback.create_peer_source().unwrap();
        playback.play_frames(id, &[500; 960], 960, 1, 48000).unwrap();
        assert_eq!(playback.queued_buffers(id), Some(1));

        playback.open("Headphones").unwrap();
        assert!(playback.has_source(id));
        assert_eq!(playback.queued_buffers(id), Some(0));
        assert_eq!(playback.device_name(), Some("Headphones"));
        assert_eq!(backend.open_outputs(), ["Headphones"]);

        playback.play_frames(id, &[500; 960], 960, 1, 48000).unwrap();
        assert_eq!(playback.queued_buffers(id), Some(1));
    }

    #[test]
    fn test_one_shot_replaces_main_source() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();
        playback.set_volume(0.5);

        let a = Sound::from_samples(&[4000; 480], StreamFormat::new(48000, 1));
        let b = Sound::from_samples(&[16384; 480], StreamFormat::new(48000, 1));
        playback.play_one_shot(&a).unwrap();
        playback.play_one_shot(&b).unwrap();

        assert_eq!(playback.queued_buffers(SourceId::MAIN), Some(1));
        assert!(playback.main_active());

        let out = backend.render_output("Speakers", 4).unwrap();
        assert!(out.iter().all(|&s| (s - 8191).abs() <= 1), "{out:?}");
    }

    #[test]
    fn test_stop_active_silences_main_source() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();

        playback
            .play_one_shot(&Sound::from_samples(&[1000; 48], StreamFormat::new(48000, 1)))
            .unwrap();
        playback.stop_active();

        assert!(!playback.main_active());
        assert_eq!(backend.render_output("Speakers", 4), Some(vec![0; 8]));
    }

    #[test]
    fn test_stale_source_is_unknown() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();

        let id = playback.create_peer_source().unwrap();
        assert!(playback.destroy_peer_source(id));
        assert!(!playback.destroy_peer_source(id));

        let result = playback.play_frames(id, &[0; 960], 960, 1, 48000);
        assert!(matches!(result, Err(AudioError::UnknownSource(stale)) if stale == id));

        let result = playback.play_frames(SourceId::MAIN, &[0; 960], 960, 1, 48000);
        assert!(matches!(result, Err(AudioError::UnknownSource(_))));
        assert!(!playback.destroy_peer_source(SourceId::MAIN));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();
        let id = playback.create_peer_source().unwrap();

        let result = playback.play_frames(id, &[0; 100], 960, 2, 48000);
        assert!(matches!(result, Err(AudioError::FormatNotSupported(_))));
    }

    #[test]
    fn test_closed_device_keeps_sources() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();
        let id = playback.create_peer_source().unwrap();

        playback.close();
        assert!(playback.has_source(id));
        assert!(backend.open_outputs().is_empty());
        assert!(matches!(
            playback.play_frames(id, &[0; 960], 960, 1, 48000),
            Err(AudioError::DeviceNotReady)
        ));
    }

    #[test]
    fn test_device_pulls_mixed_peers() {
        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();

        let a = playback.create_peer_source().unwrap();
        let b = playback.create_peer_source().unwrap();
        playback.play_frames(a, &[1000; 480], 480, 1, 48000).unwrap();
        playback.play_frames(b, &[2000; 960], 480, 2, 48000).unwrap();

        let out = backend.render_output("Speakers", 480).unwrap();
        assert_eq!(out.len(), 960);
        assert!(out.iter().all(|&s| (s - 3000).abs() <= 1), "{:?}", &out[..4]);

        assert_eq!(playback.sweep(), 2);
        assert_eq!(playback.stats().buffers_played, 2);
    }

    #[test]
    fn test_play_one_shot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ring.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..480 {
            writer.write_sample(1000i16).unwrap();
        }
        writer.finalize().unwrap();

        let backend = MemoryBackend::new().with_output("Speakers");
        let mut playback = engine(&backend);
        playback.open("Speakers").unwrap();

        playback.play_one_shot_file(&path).unwrap();
        assert!(playback.main_active());
        assert!(matches!(
            playback.play_one_shot_file(dir.path().join("missing.wav")),
            Err(AudioError::SoundLoad(_))
        ));
    }
}
