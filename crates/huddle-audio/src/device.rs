//! Audio device enumeration and resolution.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use huddle_ipc::{AudioDevice, DeviceKind, SYSTEM_DEFAULT_DEVICE};

use crate::error::AudioError;
use crate::AudioResult;

/// Sample rate and channel layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Interleaved channel count.
    pub channels: u16,
}

impl StreamFormat {
    /// Create a new stream format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of interleaved samples covering `duration`.
    pub fn samples_for(&self, duration: std::time::Duration) -> usize {
        let frames = (self.sample_rate as u128 * duration.as_micros() / 1_000_000) as usize;
        frames * self.channels as usize
    }
}

/// Callback that fills an interleaved i16 buffer in the output device format.
///
/// Called from the device's real-time thread.
pub type RenderFn = Arc<dyn Fn(&mut [i16]) + Send + Sync>;

/// An open capture device.
///
/// Dropping the handle stops capture and releases the device.
pub trait InputDevice: Send {
    /// Name of the device that was opened.
    fn name(&self) -> &str;

    /// Format of the samples produced by [`read_available`](Self::read_available).
    fn format(&self) -> StreamFormat;

    /// Append every sample captured since the previous call to `out`.
    ///
    /// Never blocks; returns the number of samples appended.
    fn read_available(&mut self, out: &mut Vec<i16>) -> AudioResult<usize>;
}

/// An open playback device.
///
/// The device pulls audio through the [`RenderFn`] it was opened with;
/// dropping the handle stops playback and releases the device.
pub trait OutputDevice: Send {
    /// Name of the device that was opened.
    fn name(&self) -> &str;

    /// Format the render callback is asked to fill.
    fn format(&self) -> StreamFormat;
}

/// Platform audio layer.
pub trait AudioBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Names of all capture devices.
    fn input_device_names(&self) -> AudioResult<Vec<String>>;

    /// Names of all playback devices.
    fn output_device_names(&self) -> AudioResult<Vec<String>>;

    /// Name of the platform default capture device, if any.
    fn default_input_device(&self) -> Option<String>;

    /// Name of the platform default playback device, if any.
    fn default_output_device(&self) -> Option<String>;

    /// Open the capture device called `name`.
    fn open_input(&self, name: &str, format: StreamFormat) -> AudioResult<Box<dyn InputDevice>>;

    /// Open the playback device called `name`, pulling audio from `render`.
    fn open_output(
        &self,
        name: &str,
        format: StreamFormat,
        render: RenderFn,
    ) -> AudioResult<Box<dyn OutputDevice>>;
}

/// Returns true if `name` asks for the platform default device.
pub fn is_default_request(name: &str) -> bool {
    name.is_empty() || name == SYSTEM_DEFAULT_DEVICE
}

/// Enumerates devices and resolves saved names to open handles.
#[derive(Clone)]
pub struct DeviceCatalog {
    backend: Arc<dyn AudioBackend>,
}

impl DeviceCatalog {
    /// Create a catalog over the given backend.
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }

    /// List capture devices, "System Default" first.
    #[instrument(name = "list_input_devices", skip(self))]
    pub fn list_input_devices(&self) -> Vec<AudioDevice> {
        self.list_devices(DeviceKind::Input)
    }

    /// List playback devices, "System Default" first.
    #[instrument(name = "list_output_devices", skip(self))]
    pub fn list_output_devices(&self) -> Vec<AudioDevice> {
        self.list_devices(DeviceKind::Output)
    }

    fn list_devices(&self, kind: DeviceKind) -> Vec<AudioDevice> {
        let mut devices = vec![AudioDevice::system_default(kind)];

        match self.device_names(kind) {
            Ok(names) => {
                for name in names {
                    if !devices.iter().any(|d| d.name == name) {
                        devices.push(AudioDevice::new(name, kind));
                    }
                }
            }
            Err(e) => warn!(%kind, "Failed to enumerate audio devices: {}", e),
        }

        debug!(%kind, count = devices.len(), "Enumerated audio devices");
        devices
    }

    /// Open a capture device, falling back to the default device.
    pub fn resolve_input(
        &self,
        name: &str,
        format: StreamFormat,
    ) -> AudioResult<Box<dyn InputDevice>> {
        let resolved = self.resolve_name(name, DeviceKind::Input)?;
        match self.backend.open_input(&resolved, format) {
            Err(AudioError::DeviceNotFound(_)) if !is_default_request(name) => {
                warn!(device = %resolved, "Input device vanished, opening default");
                let fallback = self.default_name(DeviceKind::Input)?;
                self.backend.open_input(&fallback, format)
            }
            result => result,
        }
    }

    /// Open a playback device, falling back to the default device.
    pub fn resolve_output(
        &self,
        name: &str,
        format: StreamFormat,
        render: RenderFn,
    ) -> AudioResult<Box<dyn OutputDevice>> {
        let resolved = self.resolve_name(name, DeviceKind::Output)?;
        match self
            .backend
            .open_output(&resolved, format, Arc::clone(&render))
        {
            Err(AudioError::DeviceNotFound(_)) if !is_default_request(name) => {
                warn!(device = %resolved, "Output device vanished, opening default");
                let fallback = self.default_name(DeviceKind::Output)?;
                self.backend.open_output(&fallback, format, render)
            }
            result => result,
        }
    }

    /// Map a saved device name to the name of a present device.
    fn resolve_name(&self, requested: &str, kind: DeviceKind) -> AudioResult<String> {
        if !is_default_request(requested) {
            let names = self.device_names(kind)?;
            if names.iter().any(|n| n == requested) {
                return Ok(requested.to_string());
            }
            warn!(
                device = requested,
                %kind,
                "{}, falling back to default",
                AudioError::DeviceNotFound(requested.to_string())
            );
        }

        self.default_name(kind)
    }

    fn default_name(&self, kind: DeviceKind) -> AudioResult<String> {
        let default = match kind {
            DeviceKind::Input => self.backend.default_input_device(),
            DeviceKind::Output => self.backend.default_output_device(),
        };

        match default {
            Some(name) => Ok(name),
            None => self
                .device_names(kind)?
                .into_iter()
                .next()
                .ok_or_else(|| AudioError::DeviceNotFound(format!("no {kind} device available"))),
        }
    }

    fn device_names(&self, kind: DeviceKind) -> AudioResult<Vec<String>> {
        match kind {
            DeviceKind::Input => self.backend.input_device_names(),
            DeviceKind::Output => self.backend.output_device_names(),
        }
    }

    /// Backend name for logging.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
