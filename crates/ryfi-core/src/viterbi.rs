//! Soft-decision Viterbi decoder for the rate-1/2 K=7 inner code.
//!
//! Walks the 64-state trellis with a Euclidean branch metric against the
//! ideal BPSK points (+1 for bit 0, -1 for bit 1), keeping one survivor
//! per state, and traces back over the whole frame from the minimum-metric
//! end state. The trellis resets at every frame boundary; the encoder
//! sends no tail bits, so the end state is unknown and truncation is
//! absorbed by picking the best metric.

use crate::bits;
use crate::convolutional::{CONSTRAINT_LENGTH, GENERATORS, NUM_STATES};

/// Precomputed trellis for the fixed code.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    /// Expected (G1, G2) symbol pair per (state, input), as ±1.0.
    expected: Vec<[[f64; 2]; 2]>,
    /// Successor state per (state, input).
    next_state: Vec<[usize; 2]>,
}

impl Default for ViterbiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ViterbiDecoder {
    pub fn new() -> Self {
        let mut expected = Vec::with_capacity(NUM_STATES);
        let mut next_state = Vec::with_capacity(NUM_STATES);
        for state in 0..NUM_STATES as u32 {
            let mut exp = [[0.0f64; 2]; 2];
            let mut next = [0usize; 2];
            for input in 0..2u32 {
                let reg = (input << (CONSTRAINT_LENGTH - 1)) | state;
                for (g, gen) in GENERATORS.iter().enumerate() {
                    let bit = (reg & gen).count_ones() & 1 == 1;
                    exp[input as usize][g] = if bit { -1.0 } else { 1.0 };
                }
                next[input as usize] = ((reg >> 1) & (NUM_STATES as u32 - 1)) as usize;
            }
            expected.push(exp);
            next_state.push(next);
        }
        Self {
            expected,
            next_state,
        }
    }

    /// Decode one frame of soft symbols (two per data bit) into bytes.
    ///
    /// # Panics
    ///
    /// Panics unless `soft.len()` is a multiple of 16 (two symbols per
    /// bit, eight bits per byte).
    pub fn decode_frame(&self, soft: &[f64]) -> Vec<u8> {
        assert!(
            soft.len() % 16 == 0,
            "soft symbol count must decode to whole bytes"
        );
        let num_steps = soft.len() / 2;
        if num_steps == 0 {
            return Vec::new();
        }

        let mut metrics = [f64::INFINITY; NUM_STATES];
        metrics[0] = 0.0; // encoder starts cleared

        // Survivor memory: predecessor state and decided bit per step.
        let mut prev_states: Vec<[u8; NUM_STATES]> = Vec::with_capacity(num_steps);
        let mut decisions: Vec<[bool; NUM_STATES]> = Vec::with_capacity(num_steps);

        for step in 0..num_steps {
            let r0 = soft[step * 2];
            let r1 = soft[step * 2 + 1];
            let mut new_metrics = [f64::INFINITY; NUM_STATES];
            let mut new_prev = [0u8; NUM_STATES];
            let mut new_bits = [false; NUM_STATES];

            for state in 0..NUM_STATES {
                let metric = metrics[state];
                if metric.is_infinite() {
                    continue;
                }
                for input in 0..2 {
                    let exp = self.expected[state][input];
                    let d0 = r0 - exp[0];
                    let d1 = r1 - exp[1];
                    let candidate = metric + d0 * d0 + d1 * d1;
                    let next = self.next_state[state][input];
                    if candidate < new_metrics[next] {
                        new_metrics[next] = candidate;
                        new_prev[next] = state as u8;
                        new_bits[next] = input == 1;
                    }
                }
            }

            metrics = new_metrics;
            prev_states.push(new_prev);
            decisions.push(new_bits);
        }

        // Truncated frame: start the traceback at the best end state.
        let mut state = 0;
        let mut best = f64::INFINITY;
        for (s, &m) in metrics.iter().enumerate() {
            if m < best {
                best = m;
                state = s;
            }
        }

        let mut decoded = vec![false; num_steps];
        for step in (0..num_steps).rev() {
            decoded[step] = decisions[step][state];
            state = prev_states[step][state] as usize;
        }

        bits::bits_to_bytes(&decoded)
    }
}
