//! One-shot sound clips.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::device::StreamFormat;
use crate::error::AudioError;
use crate::{AudioResult, SAMPLE_RATE};

/// A short PCM clip, stored as interleaved little-endian i16 bytes.
#[derive(Debug, Clone)]
pub struct Sound {
    data: Bytes,
    format: StreamFormat,
}

impl Sound {
    /// Wrap raw mono 16-bit little-endian PCM at the engine sample rate.
    pub fn from_mono16(data: impl Into<Bytes>) -> AudioResult<Self> {
        Self::from_pcm_bytes(data, StreamFormat::new(SAMPLE_RATE, 1))
    }

    /// Wrap raw 16-bit little-endian PCM in `format`.
    pub fn from_pcm_bytes(data: impl Into<Bytes>, format: StreamFormat) -> AudioResult<Self> {
        let data = data.into();
        let frame_bytes = 2 * format.channels as usize;

        if frame_bytes == 0 || data.len() % frame_bytes != 0 {
            return Err(AudioError::FormatNotSupported(format!(
                "{} bytes is not a whole number of {}-channel 16-bit frames",
                data.len(),
                format.channels
            )));
        }

        Ok(Self { data, format })
    }

    /// Load a WAV file, converting any integer or float encoding to 16-bit.
    pub fn load_wav(path: impl AsRef<Path>) -> AudioResult<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader.samples::<i16>().collect::<Result<_, _>>()?,
            (hound::SampleFormat::Int, bits) if (1..=32).contains(&bits) => reader
                .samples::<i32>()
                .map(|s| s.map(|s| rescale_int(s, bits)))
                .collect::<Result<_, _>>()?,
            (hound::SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()?,
            (format, bits) => {
                return Err(AudioError::SoundLoad(format!(
                    "unsupported WAV encoding {format:?} {bits}-bit"
                )))
            }
        };

        debug!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            samples = samples.len(),
            "Loaded sound"
        );

        Ok(Self::from_samples(
            &samples,
            StreamFormat::new(spec.sample_rate, spec.channels),
        ))
    }

    /// Build a clip from interleaved samples.
    pub fn from_samples(samples: &[i16], format: StreamFormat) -> Self {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            data: Bytes::from(data),
            format,
        }
    }

    /// Format of the clip.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Decoded interleaved samples.
    pub fn samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    /// Raw little-endian bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Playing time of the clip.
    pub fn duration(&self) -> Duration {
        let frames = self.data.len() / (2 * self.format.channels.max(1) as usize);
        Duration::from_secs_f64(frames as f64 / self.format.sample_rate.max(1) as f64)
    }
}

fn rescale_int(sample: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (sample >> (bits - 16)) as i16
    } else {
        (sample << (16 - bits)) as i16
    }
}
