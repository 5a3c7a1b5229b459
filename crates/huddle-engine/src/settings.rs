//! Persistence of audio settings.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info};

use huddle_ipc::AudioSettings;

use crate::error::{EngineError, EngineResult};

/// Storage for the persisted audio knobs.
pub trait SettingsStore: Send + Sync {
    /// Read the stored settings, or defaults if nothing was stored yet.
    fn load(&self) -> EngineResult<AudioSettings>;

    /// Write the settings back.
    fn save(&self, settings: &AudioSettings) -> EngineResult<()>;
}

/// Settings kept in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<AudioSettings>,
    saves: AtomicUsize,
}

impl MemorySettingsStore {
    /// Create a store preloaded with `settings`.
    pub fn new(settings: AudioSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            saves: AtomicUsize::new(0),
        }
    }

    /// Last saved settings.
    pub fn current(&self) -> AudioSettings {
        self.settings.lock().clone()
    }

    /// Number of saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> EngineResult<AudioSettings> {
        Ok(self.current())
    }

    fn save(&self, settings: &AudioSettings) -> EngineResult<()> {
        *self.settings.lock() = settings.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Settings stored as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    /// Use the file at `path`; it is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, err: std::io::Error) -> EngineError {
        EngineError::Settings(format!("{}: {}", self.path.display(), err))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> EngineResult<AudioSettings> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(AudioSettings::default());
        }

        let json = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let settings = serde_json::from_str(&json)?;
        debug!(path = %self.path.display(), "Settings loaded");
        Ok(settings)
    }

    fn save(&self, settings: &AudioSettings) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemorySettingsStore::default();
        let settings = AudioSettings {
            input_gain_db: 6.0,
            ..Default::default()
        };

        store.save(&settings).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().unwrap().input_gain_db, 6.0);
    }

    #[test]
    fn test_json_store_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("audio.json"));
        assert_eq!(store.load().unwrap(), AudioSettings::default());
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("profile").join("audio.json"));

        let settings = AudioSettings {
            input_device: "USB Headset".to_string(),
            voice_hold_ms: 600,
            output_volume: 0.25,
            ..Default::default()
        };
        store.save(&settings).unwrap();

        assert!(store.path().exists());
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.json");
        fs::write(&path, "not json").unwrap();

        let result = JsonSettingsStore::new(path).load();
        assert!(matches!(result, Err(EngineError::Settings(_))));
    }
}
