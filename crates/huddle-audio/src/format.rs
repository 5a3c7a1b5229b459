//! PCM format conversion between peer streams and the output device.

use crate::device::StreamFormat;
use crate::error::AudioError;
use crate::AudioResult;

/// Convert interleaved samples from `from` to `to`.
///
/// Channels are averaged down to mono, duplicated up from mono, and
/// otherwise mapped round-robin; the sample rate is converted by linear
/// interpolation.
pub fn convert(samples: &[i16], from: StreamFormat, to: StreamFormat) -> AudioResult<Vec<i16>> {
    if from.channels == 0 || from.sample_rate == 0 {
        return Err(AudioError::FormatNotSupported(format!(
            "{} channels at {} Hz",
            from.channels, from.sample_rate
        )));
    }
    if samples.len() % from.channels as usize != 0 {
        return Err(AudioError::FormatNotSupported(format!(
            "{} samples is not a whole number of {}-channel frames",
            samples.len(),
            from.channels
        )));
    }

    let mapped = convert_channels(samples, from.channels, to.channels);
    Ok(convert_sample_rate(
        &mapped,
        to.channels,
        from.sample_rate,
        to.sample_rate,
    ))
}

fn convert_channels(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
    let from = from as usize;
    let to = to as usize;

    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            out.push((sum / from as i32) as i16);
        } else if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else {
            out.extend((0..to).map(|ch| frame[ch % from]));
        }
    }

    out
}

fn convert_sample_rate(samples: &[i16], channels: u16, from: u32, to: u32) -> Vec<i16> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }

    let channels = channels as usize;
    let in_frames = samples.len() / channels;
    let out_frames = (in_frames as u64 * to as u64 / from as u64) as usize;
    let step = from as f64 / to as f64;

    let mut out = Vec::with_capacity(out_frames * channels);
    for i in 0..out_frames {
        let position = i as f64 * step;
        let index = position.floor() as usize;
        let fraction = position - index as f64;
        let next = (index + 1).min(in_frames - 1);

        for ch in 0..channels {
            let a = samples[index * channels + ch] as f64;
            let b = samples[next * channels + ch] as f64;
            out.push((a + (b - a) * fraction) as i16);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_to_stereo() {
        let out = convert(
            &[1, 2, 3],
            StreamFormat::new(48000, 1),
            StreamFormat::new(48000, 2),
        )
        .unwrap();
        assert_eq!(out, [1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_stereo_to_mono() {
        let out = convert(
            &[100, 200, -50, 50],
            StreamFormat::new(48000, 2),
            StreamFormat::new(48000, 1),
        )
        .unwrap();
        assert_eq!(out, [150, 0]);
    }

    #[test]
    fn test_upsample_doubles_frames() {
        let out = convert(
            &[0, 100, 200, 300],
            StreamFormat::new(24000, 1),
            StreamFormat::new(48000, 1),
        )
        .unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &[0, 50, 100, 150]);
    }

    #[test]
    fn test_downsample_halves_frames() {
        let input: Vec<i16> = (0..960).map(|i| i as i16).collect();
        let out = convert(
            &input,
            StreamFormat::new(48000, 1),
            StreamFormat::new(24000, 1),
        )
        .unwrap();
        assert_eq!(out.len(), 480);
        assert_eq!(out[1], 2);
    }

    #[test]
    fn test_rejects_partial_frames() {
        let result = convert(
            &[1, 2, 3],
            StreamFormat::new(48000, 2),
            StreamFormat::new(48000, 2),
        );
        assert!(matches!(result, Err(AudioError::FormatNotSupported(_))));
    }

    #[test]
    fn test_rejects_zero_channels() {
        let result = convert(&[], StreamFormat::new(48000, 0), StreamFormat::new(48000, 2));
        assert!(result.is_err());
    }
}
