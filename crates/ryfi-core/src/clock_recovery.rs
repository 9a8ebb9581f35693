//! Mueller & Müller symbol timing recovery.
//!
//! Picks the symbol-rate sampling instants out of the matched-filter
//! output. The M&M timing error detector needs only one sample per
//! symbol:
//!
//! ```text
//! e[n] = y[n-1] * (y[n] - y[n-2])
//! ```
//!
//! and a proportional-integral loop steers both the fractional phase and
//! the samples-per-symbol estimate. Works at any oversampling above 1,
//! including the link's fractional 25/12.

/// M&M clock recovery over real soft symbols.
#[derive(Debug, Clone)]
pub struct ClockRecovery {
    /// Nominal samples per symbol.
    omega_nominal: f64,
    /// Tracked samples per symbol.
    omega: f64,
    /// Fractional sample phase.
    mu: f64,
    gain_mu: f64,
    gain_omega: f64,
    /// Allowed relative deviation of omega from nominal.
    omega_limit: f64,
    prev: f64,
    prev_prev: f64,
    buffer: Vec<f64>,
    read_pos: usize,
}

impl ClockRecovery {
    /// `sps` is the nominal samples per symbol, `loop_bw` the loop
    /// bandwidth (0.01..0.1 typical).
    pub fn new(sps: f64, loop_bw: f64) -> Self {
        assert!(sps > 1.0, "need more than 1 sample per symbol");
        let denom = 1.0 + 2.0 * 0.707 * loop_bw + loop_bw * loop_bw;
        Self {
            omega_nominal: sps,
            omega: sps,
            mu: 0.0,
            gain_mu: 4.0 * 0.707 * loop_bw / denom,
            gain_omega: 4.0 * loop_bw * loop_bw / denom,
            omega_limit: 0.005,
            prev: 0.0,
            prev_prev: 0.0,
            buffer: Vec::new(),
            read_pos: 0,
        }
    }

    /// Consume matched-filter samples, produce soft symbols.
    pub fn process(&mut self, input: &[f64]) -> Vec<f64> {
        self.buffer.extend_from_slice(input);
        let mut symbols = Vec::new();

        while self.read_pos + 1 < self.buffer.len() {
            // Linear interpolation at the current fractional phase.
            let frac = self.mu;
            let sample =
                self.buffer[self.read_pos] * (1.0 - frac) + self.buffer[self.read_pos + 1] * frac;

            let error = self.prev * (sample - self.prev_prev);
            self.prev_prev = self.prev;
            self.prev = sample;

            self.omega += self.gain_omega * error;
            let lo = self.omega_nominal * (1.0 - self.omega_limit);
            let hi = self.omega_nominal * (1.0 + self.omega_limit);
            self.omega = self.omega.clamp(lo, hi);

            self.mu += self.omega + self.gain_mu * error;
            let advance = self.mu as usize;
            self.read_pos += advance;
            self.mu -= advance as f64;

            symbols.push(sample);
        }

        if self.read_pos > 0 {
            let consumed = self.read_pos.min(self.buffer.len());
            self.buffer.drain(..consumed);
            self.read_pos -= consumed;
        }
        symbols
    }

    /// Current samples-per-symbol estimate.
    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn reset(&mut self) {
        self.omega = self.omega_nominal;
        self.mu = 0.0;
        self.prev = 0.0;
        self.prev_prev = 0.0;
        self.buffer.clear();
        self.read_pos = 0;
    }
}
