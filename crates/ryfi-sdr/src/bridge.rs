//! Sample-format bridge between hardware buffers and the DSP.
//!
//! Radios deliver interleaved int16 I/Q; the DSP runs on complex floats.
//! The conversion is a flat 1/2048 scale (12-bit converters sit in the
//! low bits of the int16) and saturates on the way back out.

use num_complex::Complex64;

/// Full-scale divisor for 12-bit I/Q in an int16.
pub const SAMPLE_SCALE: f64 = 1.0 / 2048.0;

/// Interleaved int16 I/Q → complex floats.
pub fn int16_to_complex(raw: &[i16]) -> Vec<Complex64> {
    raw.chunks_exact(2)
        .map(|iq| Complex64::new(iq[0] as f64 * SAMPLE_SCALE, iq[1] as f64 * SAMPLE_SCALE))
        .collect()
}

/// Complex floats → interleaved int16 I/Q, saturating at full scale.
pub fn complex_to_int16(samples: &[Complex64]) -> Vec<i16> {
    let mut raw = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        raw.push(quantize(s.re));
        raw.push(quantize(s.im));
    }
    raw
}

#[inline]
fn quantize(v: f64) -> i16 {
    (v / SAMPLE_SCALE).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
