#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use huddle_audio::MemoryBackend;
use huddle_engine::{AudioFacade, EngineConfig, MemorySettingsStore};
use huddle_ipc::AudioEvent;

/// Period of one I/O tick.
pub const TICK: Duration = Duration::from_millis(20);

/// Mono samples in one 20 ms frame at 48 kHz.
pub const FRAME: usize = 960;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Backend with one capture and two playback devices.
pub fn backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_input("Mic")
        .with_input("USB Mic")
        .with_output("Speakers")
        .with_output("Headphones")
}

pub fn engine(backend: &MemoryBackend) -> (Arc<AudioFacade>, Arc<MemorySettingsStore>) {
    init_tracing();
    let store = Arc::new(MemorySettingsStore::default());
    let facade = AudioFacade::new(
        Arc::new(backend.clone()),
        store.clone(),
        EngineConfig::default(),
    )
    .unwrap();
    (Arc::new(facade), store)
}

/// A mono frame whose RMS level is `volume`.
pub fn frame_at(volume: f32) -> Vec<i16> {
    vec![(volume * 32768.0) as i16; FRAME]
}

/// Little-endian bytes of `count` mono samples of value `sample`.
pub fn mono16(sample: i16, count: usize) -> Vec<u8> {
    (0..count).flat_map(|_| sample.to_le_bytes()).collect()
}

pub fn drain(events: &crossbeam_channel::Receiver<AudioEvent>) -> Vec<AudioEvent> {
    events.try_iter().collect()
}
