//! Streaming FIR filtering and windowed-sinc lowpass design.
//!
//! Used twice on the receive side: a lowpass ahead of the demodulator to
//! strip out-of-band energy, and the root-raised-cosine matched filter
//! (taps from [`crate::rrc::rrc_taps`]) ahead of clock recovery.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Direct-form FIR with real taps over complex samples.
#[derive(Debug, Clone)]
pub struct FirFilter {
    taps: Vec<f64>,
    delay: Vec<Complex64>,
    pos: usize,
}

impl FirFilter {
    pub fn new(taps: Vec<f64>) -> Self {
        assert!(!taps.is_empty(), "FIR needs at least one tap");
        let len = taps.len();
        Self {
            taps,
            delay: vec![Complex64::new(0.0, 0.0); len],
            pos: 0,
        }
    }

    /// Windowed-sinc lowpass (Blackman window). `transition` sets the tap
    /// count: narrower transition, longer filter.
    pub fn lowpass(cutoff: f64, transition: f64, samplerate: f64) -> Self {
        Self::new(lowpass_taps(cutoff, transition, samplerate))
    }

    /// Filter a single sample.
    pub fn process_sample(&mut self, input: Complex64) -> Complex64 {
        self.delay[self.pos] = input;
        let len = self.taps.len();
        let mut acc = Complex64::new(0.0, 0.0);
        for (i, &tap) in self.taps.iter().enumerate() {
            acc += self.delay[(self.pos + len - i) % len] * tap;
        }
        self.pos = (self.pos + 1) % len;
        acc
    }

    /// Filter a block.
    pub fn process_block(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        input.iter().map(|&s| self.process_sample(s)).collect()
    }

    pub fn num_taps(&self) -> usize {
        self.taps.len()
    }

    /// Group delay in samples (linear phase).
    pub fn group_delay(&self) -> usize {
        (self.taps.len() - 1) / 2
    }

    pub fn reset(&mut self) {
        self.delay.fill(Complex64::new(0.0, 0.0));
        self.pos = 0;
    }
}

/// Design lowpass taps with a Blackman-windowed sinc.
pub fn lowpass_taps(cutoff: f64, transition: f64, samplerate: f64) -> Vec<f64> {
    assert!(cutoff > 0.0 && cutoff < samplerate / 2.0, "bad cutoff");
    assert!(transition > 0.0, "bad transition width");

    // Blackman window needs roughly 5.5 / normalized transition width.
    let mut num_taps = (5.5 * samplerate / transition).ceil() as usize;
    if num_taps % 2 == 0 {
        num_taps += 1;
    }

    let fc = cutoff / samplerate;
    let half = (num_taps - 1) as f64 / 2.0;
    let mut taps = Vec::with_capacity(num_taps);
    for i in 0..num_taps {
        let t = i as f64 - half;
        let sinc = if t.abs() < 1e-12 {
            2.0 * fc
        } else {
            (2.0 * PI * fc * t).sin() / (PI * t)
        };
        let w = 0.42 - 0.5 * (2.0 * PI * i as f64 / (num_taps - 1) as f64).cos()
            + 0.08 * (4.0 * PI * i as f64 / (num_taps - 1) as f64).cos();
        taps.push(sinc * w);
    }

    // Unity gain at DC.
    let sum: f64 = taps.iter().sum();
    for tap in taps.iter_mut() {
        *tap /= sum;
    }
    taps
}
