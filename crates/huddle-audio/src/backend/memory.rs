//! In-process audio backend.
//!
//! Devices are plain names; captured audio is whatever the owner pushes with
//! [`MemoryBackend::push_input`], and playback is pulled on demand with
//! [`MemoryBackend::render_output`]. Every open and close is recorded so
//! callers can observe device lifecycle.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::{AudioBackend, InputDevice, OutputDevice, RenderFn, StreamFormat};
use crate::error::AudioError;
use crate::AudioResult;

/// A device lifecycle operation observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOp {
    OpenInput(String),
    CloseInput(String),
    OpenOutput(String),
    CloseOutput(String),
}

struct OpenInput {
    id: u64,
    name: String,
    queue: VecDeque<i16>,
    failed: bool,
}

struct OpenOutput {
    id: u64,
    name: String,
    format: StreamFormat,
    render: RenderFn,
}

#[derive(Default)]
struct MemoryHost {
    inputs: Vec<String>,
    outputs: Vec<String>,
    default_input: Option<String>,
    default_output: Option<String>,
    open_inputs: Vec<OpenInput>,
    open_outputs: Vec<OpenOutput>,
    operations: Vec<DeviceOp>,
    fail_opens: bool,
    next_id: u64,
}

impl MemoryHost {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Audio backend whose devices live in memory.
///
/// Cloning yields another handle to the same set of devices.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    host: Arc<Mutex<MemoryHost>>,
}

impl MemoryBackend {
    /// Create a backend without any devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capture device; the first one added is the default.
    pub fn with_input(self, name: &str) -> Self {
        self.add_device(name, true);
        self
    }

    /// Add a playback device; the first one added is the default.
    pub fn with_output(self, name: &str) -> Self {
        self.add_device(name, false);
        self
    }

    /// Add a device at runtime (hot-plug).
    pub fn add_device(&self, name: &str, input: bool) {
        let mut host = self.host.lock();
        if input {
            host.inputs.push(name.to_string());
        } else {
            host.outputs.push(name.to_string());
        }
    }

    /// Remove a device (unplug). Open handles keep working until closed.
    pub fn remove_device(&self, name: &str) {
        let mut host = self.host.lock();
        host.inputs.retain(|n| n != name);
        host.outputs.retain(|n| n != name);
        if host.default_input.as_deref() == Some(name) {
            host.default_input = None;
        }
        if host.default_output.as_deref() == Some(name) {
            host.default_output = None;
        }
    }

    /// Override the default capture device.
    pub fn set_default_input(&self, name: &str) {
        self.host.lock().default_input = Some(name.to_string());
    }

    /// Override the default playback device.
    pub fn set_default_output(&self, name: &str) {
        self.host.lock().default_output = Some(name.to_string());
    }

    /// Make every subsequent open fail with a hardware error.
    pub fn set_fail_opens(&self, fail: bool) {
        self.host.lock().fail_opens = fail;
    }

    /// Make reads on the open capture device `name` fail.
    pub fn fail_input(&self, name: &str) {
        let mut host = self.host.lock();
        for input in host.open_inputs.iter_mut().filter(|i| i.name == name) {
            input.failed = true;
        }
    }

    /// Feed samples into the open capture device `name`.
    ///
    /// Returns false (and drops the samples) if the device is not open.
    pub fn push_input(&self, name: &str, samples: &[i16]) -> bool {
        let mut host = self.host.lock();
        let mut delivered = false;
        for input in host.open_inputs.iter_mut().filter(|i| i.name == name) {
            input.queue.extend(samples.iter().copied());
            delivered = true;
        }
        delivered
    }

    /// Pull `frames` frames of playback from the open output device `name`.
    ///
    /// Returns `None` if the device is not open.
    pub fn render_output(&self, name: &str, frames: usize) -> Option<Vec<i16>> {
        let (render, format) = {
            let host = self.host.lock();
            let output = host.open_outputs.iter().find(|o| o.name == name)?;
            (Arc::clone(&output.render), output.format)
        };

        let mut buffer = vec![0i16; frames * format.channels as usize];
        render(&mut buffer);
        Some(buffer)
    }

    /// Names of the currently open capture devices.
    pub fn open_inputs(&self) -> Vec<String> {
        self.host
            .lock()
            .open_inputs
            .iter()
            .map(|i| i.name.clone())
            .collect()
    }

    /// Names of the currently open playback devices.
    pub fn open_outputs(&self) -> Vec<String> {
        self.host
            .lock()
            .open_outputs
            .iter()
            .map(|o| o.name.clone())
            .collect()
    }

    /// Lifecycle operations recorded so far.
    pub fn operations(&self) -> Vec<DeviceOp> {
        self.host.lock().operations.clone()
    }

    /// Forget recorded operations.
    pub fn clear_operations(&self) {
        self.host.lock().operations.clear();
    }
}

impl AudioBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn input_device_names(&self) -> AudioResult<Vec<String>> {
        Ok(self.host.lock().inputs.clone())
    }

    fn output_device_names(&self) -> AudioResult<Vec<String>> {
        Ok(self.host.lock().outputs.clone())
    }

    fn default_input_device(&self) -> Option<String> {
        let host = self.host.lock();
        host.default_input
            .clone()
            .or_else(|| host.inputs.first().cloned())
    }

    fn default_output_device(&self) -> Option<String> {
        let host = self.host.lock();
        host.default_output
            .clone()
            .or_else(|| host.outputs.first().cloned())
    }

    fn open_input(&self, name: &str, format: StreamFormat) -> AudioResult<Box<dyn InputDevice>> {
        let mut host = self.host.lock();
        if host.fail_opens {
            return Err(AudioError::hardware("memory backend refused to open input"));
        }
        if !host.inputs.iter().any(|n| n == name) {
            return Err(AudioError::DeviceNotFound(name.to_string()));
        }

        let id = host.next_id();
        host.open_inputs.push(OpenInput {
            id,
            name: name.to_string(),
            queue: VecDeque::new(),
            failed: false,
        });
        host.operations.push(DeviceOp::OpenInput(name.to_string()));
        debug!(device = name, "Memory input opened");

        Ok(Box::new(MemoryInput {
            host: Arc::clone(&self.host),
            id,
            name: name.to_string(),
            format,
        }))
    }

    fn open_output(
        &self,
        name: &str,
        format: StreamFormat,
        render: RenderFn,
    ) -> AudioResult<Box<dyn OutputDevice>> {
        let mut host = self.host.lock();
        if host.fail_opens {
            return Err(AudioError::hardware("memory backend refused to open output"));
        }
        if !host.outputs.iter().any(|n| n == name) {
            return Err(AudioError::DeviceNotFound(name.to_string()));
        }

        let id = host.next_id();
        host.open_outputs.push(OpenOutput {
            id,
            name: name.to_string(),
            format,
            render,
        });
        host.operations.push(DeviceOp::OpenOutput(name.to_string()));
        debug!(device = name, "Memory output opened");

        Ok(Box::new(MemoryOutput {
            host: Arc::clone(&self.host),
            id,
            name: name.to_string(),
            format,
        }))
    }
}

struct MemoryInput {
    host: Arc<Mutex<MemoryHost>>,
    id: u64,
    name: String,
    format: StreamFormat,
}

impl InputDevice for MemoryInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> StreamFormat {
        self.format
    }

    fn read_available(&mut self, out: &mut Vec<i16>) -> AudioResult<usize> {
        let mut host = self.host.lock();
        let input = host
            .open_inputs
            .iter_mut()
            .find(|i| i.id == self.id)
            .ok_or(AudioError::DeviceNotReady)?;

        if input.failed {
            return Err(AudioError::hardware(format!("{} stopped responding", self.name)));
        }

        let count = input.queue.len();
        out.extend(input.queue.drain(..));
        Ok(count)
    }
}

impl Drop for MemoryInput {
    fn drop(&mut self) {
        let mut host = self.host.lock();
        host.open_inputs.retain(|i| i.id != self.id);
        host.operations.push(DeviceOp::CloseInput(self.name.clone()));
        debug!(device = %self.name, "Memory input closed");
    }
}

struct MemoryOutput {
    host: Arc<Mutex<MemoryHost>>,
    id: u64,
    name: String,
    format: StreamFormat,
}

impl OutputDevice for MemoryOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> StreamFormat {
        self.format
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        let mut host = self.host.lock();
        host.open_outputs.retain(|o| o.id != self.id);
        host.operations.push(DeviceOp::CloseOutput(self.name.clone()));
        debug!(device = %self.name, "Memory output closed");
    }
}
