//! Hardware backend built on `cpal`.
//!
//! cpal streams cannot move between threads on every platform, so each open
//! device gets a thread that builds the stream, plays it, and holds it until
//! the device handle is dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::device::{AudioBackend, InputDevice, OutputDevice, RenderFn, StreamFormat};
use crate::error::AudioError;
use crate::AudioResult;

/// Captured samples kept between reads before the oldest are discarded.
const MAX_BUFFERED_SAMPLES: usize = 48000 * 2;

const SUPPORTED_FORMATS: [SampleFormat; 3] =
    [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

/// Audio backend using the platform's default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    /// Create a backend over the default host.
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn input_device_names(&self) -> AudioResult<Vec<String>> {
        let host = cpal::default_host();
        Ok(host.input_devices()?.filter_map(|d| d.name().ok()).collect())
    }

    fn output_device_names(&self) -> AudioResult<Vec<String>> {
        let host = cpal::default_host();
        Ok(host.output_devices()?.filter_map(|d| d.name().ok()).collect())
    }

    fn default_input_device(&self) -> Option<String> {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
    }

    fn default_output_device(&self) -> Option<String> {
        cpal::default_host()
            .default_output_device()
            .and_then(|d| d.name().ok())
    }

    fn open_input(&self, name: &str, format: StreamFormat) -> AudioResult<Box<dyn InputDevice>> {
        let shared = Arc::new(InputShared::default());
        let device_name = name.to_string();
        let stream_shared = Arc::clone(&shared);

        let (thread, format) = StreamThread::spawn(name, move || {
            let device = find_device(&device_name, true)?;
            let ranges = device
                .supported_input_configs()
                .map_err(AudioError::hardware)?;
            let (config, sample_format) = choose_config(ranges, format)?;

            let stream = match sample_format {
                SampleFormat::I16 => build_input_stream::<i16>(&device, &config, stream_shared),
                SampleFormat::F32 => build_input_stream::<f32>(&device, &config, stream_shared),
                SampleFormat::U16 => build_input_stream::<u16>(&device, &config, stream_shared),
                other => Err(AudioError::FormatNotSupported(format!("{other:?}"))),
            }?;

            Ok((stream, StreamFormat::new(config.sample_rate.0, config.channels)))
        })?;

        info!(device = name, ?format, "cpal input stream started");
        Ok(Box::new(CpalInput {
            name: name.to_string(),
            format,
            shared,
            _thread: thread,
        }))
    }

    fn open_output(
        &self,
        name: &str,
        format: StreamFormat,
        render: RenderFn,
    ) -> AudioResult<Box<dyn OutputDevice>> {
        let device_name = name.to_string();

        let (thread, format) = StreamThread::spawn(name, move || {
            let device = find_device(&device_name, false)?;
            let ranges = device
                .supported_output_configs()
                .map_err(AudioError::hardware)?;
            let (config, sample_format) = choose_config(ranges, format)?;

            let stream = match sample_format {
                SampleFormat::I16 => build_output_stream::<i16>(&device, &config, render),
                SampleFormat::F32 => build_output_stream::<f32>(&device, &config, render),
                SampleFormat::U16 => build_output_stream::<u16>(&device, &config, render),
                other => Err(AudioError::FormatNotSupported(format!("{other:?}"))),
            }?;

            Ok((stream, StreamFormat::new(config.sample_rate.0, config.channels)))
        })?;

        info!(device = name, ?format, "cpal output stream started");
        Ok(Box::new(CpalOutput {
            name: name.to_string(),
            format,
            _thread: thread,
        }))
    }
}

fn find_device(name: &str, input: bool) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    let mut devices: Box<dyn Iterator<Item = cpal::Device>> = if input {
        Box::new(host.input_devices()?)
    } else {
        Box::new(host.output_devices()?)
    };

    devices
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Pick a configuration at the requested rate, preferring the requested
/// channel count.
fn choose_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    requested: StreamFormat,
) -> AudioResult<(StreamConfig, SampleFormat)> {
    let candidates: Vec<_> = ranges
        .filter(|r| {
            SUPPORTED_FORMATS.contains(&r.sample_format())
                && r.min_sample_rate().0 <= requested.sample_rate
                && r.max_sample_rate().0 >= requested.sample_rate
        })
        .collect();

    let range = candidates
        .iter()
        .find(|r| r.channels() == requested.channels)
        .or_else(|| candidates.first())
        .ok_or_else(|| {
            AudioError::FormatNotSupported(format!(
                "no configuration at {} Hz",
                requested.sample_rate
            ))
        })?;

    let config = StreamConfig {
        channels: range.channels(),
        sample_rate: cpal::SampleRate(requested.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    Ok((config, range.sample_format()))
}

#[derive(Default)]
struct InputShared {
    samples: Mutex<VecDeque<i16>>,
    failure: Mutex<Option<String>>,
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    shared: Arc<InputShared>,
) -> AudioResult<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let errors = Arc::clone(&shared);
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mut samples = shared.samples.lock();
            samples.extend(data.iter().map(|&s| i16::from_sample(s)));
            let excess = samples.len().saturating_sub(MAX_BUFFERED_SAMPLES);
            samples.drain(..excess);
        },
        move |err| {
            error!("Input stream error: {}", err);
            *errors.failure.lock() = Some(err.to_string());
        },
        None,
    )?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    render: RenderFn,
) -> AudioResult<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let mut scratch: Vec<i16> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0);
            render(&mut scratch);
            for (dst, &src) in data.iter_mut().zip(&scratch) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!("Output stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Thread owning a playing cpal stream.
struct StreamThread {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    fn spawn<F>(name: &str, build: F) -> AudioResult<(Self, StreamFormat)>
    where
        F: FnOnce() -> AudioResult<(cpal::Stream, StreamFormat)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<AudioResult<StreamFormat>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(format!("audio-{name}"))
            .spawn(move || {
                let stream = match build() {
                    Ok((stream, format)) => match stream.play() {
                        Ok(()) => {
                            let _ = ready_tx.send(Ok(format));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.into()));
                            return;
                        }
                    },
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Returns once the owning handle sends or is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Stream thread exiting");
            })
            .map_err(AudioError::hardware)?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::hardware("stream thread exited during setup")));

        match ready {
            Ok(format) => Ok((
                Self {
                    stop: stop_tx,
                    handle: Some(handle),
                },
                format,
            )),
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct CpalInput {
    name: String,
    format: StreamFormat,
    shared: Arc<InputShared>,
    _thread: StreamThread,
}

impl InputDevice for CpalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> StreamFormat {
        self.format
    }

    fn read_available(&mut self, out: &mut Vec<i16>) -> AudioResult<usize> {
        if let Some(message) = self.shared.failure.lock().clone() {
            return Err(AudioError::HardwareFailure(message));
        }

        let mut samples = self.shared.samples.lock();
        let count = samples.len();
        out.extend(samples.drain(..));
        Ok(count)
    }
}

struct CpalOutput {
    name: String,
    format: StreamFormat,
    _thread: StreamThread,
}

impl OutputDevice for CpalOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> StreamFormat {
        self.format
    }
}
