//! Automatic gain control.
//!
//! A single-rate feedback AGC: the gain nudges toward whatever makes the
//! output magnitude match the target, clamped so silence cannot drive it
//! to infinity. Sits between the transmitter and the SDR to hold the DAC
//! drive level.

use num_complex::Complex64;

/// AGC settings.
#[derive(Debug, Clone)]
pub struct AgcConfig {
    /// Output amplitude the loop converges to.
    pub target: f64,
    /// Loop rate; higher tracks faster but breathes more.
    pub rate: f64,
    /// Gain ceiling.
    pub max_gain: f64,
    /// Starting gain.
    pub initial_gain: f64,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            target: 1.0,
            rate: 1e-2,
            max_gain: 1e6,
            initial_gain: 1.0,
        }
    }
}

/// Feedback AGC over complex samples.
#[derive(Debug, Clone)]
pub struct Agc {
    config: AgcConfig,
    gain: f64,
}

impl Agc {
    pub fn new(config: AgcConfig) -> Self {
        let gain = config.initial_gain;
        Self { config, gain }
    }

    pub fn process_sample(&mut self, input: Complex64) -> Complex64 {
        let output = input * self.gain;
        self.gain += self.config.rate * (self.config.target - output.norm());
        self.gain = self.gain.clamp(0.0, self.config.max_gain);
        output
    }

    pub fn process_block(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        input.iter().map(|&s| self.process_sample(s)).collect()
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.gain = self.config.initial_gain;
    }
}
