//! Linear sample-rate conversion.
//!
//! The bridge converts between the telephone rate (8 kHz) and the AI
//! rate (24 kHz), a strict 1:3 ratio. Conversion is linear
//! interpolation over adjacent samples, which keeps frame alignment
//! exact: a 160-sample telephone frame becomes a 480-sample AI frame
//! and vice versa. Arbitrary chunk lengths are accepted so the
//! downlink can feed variable-size AI chunks straight through.

use crate::Sample;

/// Resample a block of mono PCM16 between two rates.
///
/// Output length is `len * to_hz / from_hz` (integer). For identical
/// rates the input is returned unchanged.
pub fn resample(samples: &[Sample], from_hz: u32, to_hz: u32) -> Vec<Sample> {
    if from_hz == to_hz || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = samples.len() * to_hz as usize / from_hz as usize;
    let mut out = Vec::with_capacity(out_len);
    let step = from_hz as f64 / to_hz as f64;

    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = pos - idx as f64;
        let a = samples[idx.min(samples.len() - 1)] as f64;
        let b = samples[(idx + 1).min(samples.len() - 1)] as f64;
        let value = a + (b - a) * frac;
        out.push(value.round().clamp(i16::MIN as f64, i16::MAX as f64) as Sample);
    }
    out
}
