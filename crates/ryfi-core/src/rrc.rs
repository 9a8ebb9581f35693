//! Root-raised-cosine pulse shaping and symbol-to-baseband interpolation.
//!
//! The transmit side converts the ±1 symbol stream to complex baseband at
//! the SDR sample rate through an RRC interpolator: a polyphase filterbank
//! whose prototype is the RRC pulse, stepped at an arbitrary (possibly
//! irrational) output/input ratio with linear interpolation between
//! adjacent branches. The group delay is constant and set by the filter
//! span.
//!
//! The matched half of the pair lives on the receive side as a plain FIR
//! with [`rrc_taps`] at the sample rate; TX RRC cascaded with RX RRC gives
//! a raised-cosine end to end, i.e. zero ISI at the symbol instants.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Roll-off factor shared by both ends of the link.
pub const RRC_ROLLOFF: f64 = 0.35;

/// Filter span in symbols.
pub const RRC_SPAN_SYMBOLS: usize = 31;

/// Polyphase branches in the TX interpolator.
const NUM_BRANCHES: usize = 32;

/// Design RRC taps for a given roll-off, span and samples per symbol.
/// `samples_per_symbol` may be fractional; the tap grid is still uniform
/// at the sample rate. Taps are normalized to unit energy.
pub fn rrc_taps(rolloff: f64, span_symbols: usize, samples_per_symbol: f64) -> Vec<f64> {
    assert!((0.0..=1.0).contains(&rolloff), "roll-off must be 0..=1");
    assert!(samples_per_symbol > 1.0, "need more than 1 sample/symbol");

    let half = (span_symbols as f64 * samples_per_symbol / 2.0).floor() as i64;
    let length = (2 * half + 1) as usize;
    let mut taps = Vec::with_capacity(length);

    for i in 0..length {
        let t = (i as i64 - half) as f64 / samples_per_symbol;
        taps.push(rrc_pulse(t, rolloff));
    }

    let energy: f64 = taps.iter().map(|&x| x * x).sum();
    let norm = energy.sqrt();
    for tap in taps.iter_mut() {
        *tap /= norm;
    }
    taps
}

/// The RRC impulse response at symbol-normalized time `t`.
fn rrc_pulse(t: f64, rolloff: f64) -> f64 {
    if t.abs() < 1e-10 {
        return 1.0 - rolloff + 4.0 * rolloff / PI;
    }
    if rolloff > 0.0 && ((4.0 * rolloff * t).abs() - 1.0).abs() < 1e-10 {
        let a = (1.0 + 2.0 / PI) * (PI / (4.0 * rolloff)).sin();
        let b = (1.0 - 2.0 / PI) * (PI / (4.0 * rolloff)).cos();
        return rolloff / 2.0_f64.sqrt() * (a + b);
    }
    let pi_t = PI * t;
    let four_at = 4.0 * rolloff * t;
    let num = (pi_t * (1.0 - rolloff)).sin() + four_at * (pi_t * (1.0 + rolloff)).cos();
    let denom = pi_t * (1.0 - four_at * four_at);
    if denom.abs() < 1e-10 {
        0.0
    } else {
        num / denom
    }
}

/// Polyphase RRC interpolator: real symbols in, complex baseband out.
#[derive(Debug, Clone)]
pub struct RrcInterpolator {
    /// Output samples per input symbol.
    rate: f64,
    /// Branch filters, NUM_BRANCHES of them.
    branches: Vec<Vec<f64>>,
    /// Branch-to-branch differences for linear interpolation.
    diff_branches: Vec<Vec<f64>>,
    /// Recent input symbols, newest first.
    delay: Vec<f64>,
    /// Fractional branch index accumulator.
    frac: f64,
}

impl RrcInterpolator {
    /// Create an interpolator producing `samplerate / baudrate` samples
    /// per symbol.
    pub fn new(baudrate: f64, samplerate: f64) -> Self {
        let rate = samplerate / baudrate;
        assert!(rate > 1.0, "samplerate must exceed baudrate");

        // Prototype designed at the branch oversampling, then decomposed.
        let prototype = rrc_taps(RRC_ROLLOFF, RRC_SPAN_SYMBOLS, NUM_BRANCHES as f64);
        let taps_per_branch = prototype.len().div_ceil(NUM_BRANCHES);

        let mut branches = vec![vec![0.0; taps_per_branch]; NUM_BRANCHES];
        for (i, &tap) in prototype.iter().enumerate() {
            // Scale by the branch count so total output power matches the
            // symbol power regardless of interpolation ratio.
            branches[i % NUM_BRANCHES][i / NUM_BRANCHES] = tap * (NUM_BRANCHES as f64).sqrt();
        }

        let mut diff_branches = vec![vec![0.0; taps_per_branch]; NUM_BRANCHES];
        for b in 0..NUM_BRANCHES {
            let next = (b + 1) % NUM_BRANCHES;
            for t in 0..taps_per_branch {
                diff_branches[b][t] = branches[next][t] - branches[b][t];
            }
        }

        Self {
            rate,
            branches,
            diff_branches,
            delay: vec![0.0; taps_per_branch],
            frac: 0.0,
        }
    }

    /// Output samples per input symbol.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Group delay in output samples.
    pub fn group_delay(&self) -> f64 {
        (self.delay.len() as f64 - 1.0) / 2.0 * self.rate
    }

    /// Interpolate a block of symbols to complex baseband (I axis).
    pub fn process(&mut self, symbols: &[f64]) -> Vec<Complex64> {
        let mut out = Vec::with_capacity((symbols.len() as f64 * self.rate).ceil() as usize + 1);
        let step = NUM_BRANCHES as f64 / self.rate;

        for &sym in symbols {
            self.delay.rotate_right(1);
            self.delay[0] = sym;

            while self.frac < NUM_BRANCHES as f64 {
                let idx = self.frac as usize;
                let mu = self.frac - idx as f64;
                let branch = &self.branches[idx];
                let diff = &self.diff_branches[idx];

                let mut acc = 0.0;
                for k in 0..self.delay.len() {
                    acc += self.delay[k] * (branch[k] + mu * diff[k]);
                }
                out.push(Complex64::new(acc, 0.0));
                self.frac += step;
            }
            self.frac -= NUM_BRANCHES as f64;
        }
        out
    }

    /// Clear the delay line and phase accumulator.
    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.frac = 0.0;
    }
}
