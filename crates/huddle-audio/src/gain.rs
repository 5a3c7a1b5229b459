//! Gain and level conversions.
//!
//! Pure functions shared by capture and the settings surface: decibel gain
//! to linear amplitude factor, UI slider fraction to threshold units, and
//! level measurement of 16-bit PCM.

/// Convert a gain in decibels to a linear amplitude factor.
pub fn db_to_factor(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert a linear amplitude factor to decibels.
///
/// Non-positive factors map to negative infinity.
pub fn factor_to_db(factor: f32) -> f32 {
    20.0 * factor.log10()
}

/// Map a [0, 1] slider position onto the threshold range `[min, max]`.
pub fn percent_to_threshold(percent: f32, min: f32, max: f32) -> f32 {
    let percent = 0f32.max(1f32.min(percent));
    min + percent * (max - min)
}

/// Map a threshold in `[min, max]` back onto a [0, 1] slider position.
pub fn threshold_to_percent(threshold: f32, min: f32, max: f32) -> f32 {
    if max <= min {
        return 0.0;
    }
    let percent = (threshold - min) / (max - min);
    0f32.max(1f32.min(percent))
}

/// Multiply samples by `factor`, saturating at the i16 range.
pub fn apply_gain(samples: &mut [i16], factor: f32) {
    if factor == 1.0 {
        return;
    }
    for sample in samples.iter_mut() {
        let scaled = *sample as f32 * factor;
        *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

/// Root-mean-square level of the samples, normalized to [0, 1].
pub fn rms_volume(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f64 / 32768.0;
            normalized * normalized
        })
        .sum();

    let rms = (sum_squares / samples.len() as f64).sqrt();
    rms.min(1.0) as f32
}
