//! RX framing: sync hunt, spectral inversion handling and descrambling.
//!
//! The deframer consumes soft symbols (floats, nominally ±1) and runs a
//! two-state machine:
//!
//! - **HUNT**: slide a 32-symbol window over the stream and correlate it
//!   against the known sync word at every position. Lock is declared when
//!   |correlation| reaches [`SYNC_THRESHOLD`] of the maximum; the sign of
//!   the correlation reveals whether the constellation arrived inverted,
//!   and all following symbols are conditionally negated.
//! - **LOCK**: collect exactly one frame's worth of payload symbols,
//!   descrambling as they arrive, then hand the frame downstream and go
//!   back to hunting for the next sync word.
//!
//! Sync symbols themselves never reach the decoder. If no sync word shows
//! up within twice the nominal frame interval, the inversion memory is
//! cleared and the hunt continues cold.

use crate::frame::FRAME_CODED_BITS;
use crate::framer::{sync_symbols, SYNC_BITS};
use crate::scrambler::Scrambler;
use tracing::{debug, trace};

/// Fraction of the maximum correlation that declares lock.
pub const SYNC_THRESHOLD: f64 = 0.75;

#[derive(Debug)]
enum State {
    Hunt,
    Lock { collected: Vec<f64> },
}

/// Soft-symbol sync-word deframer.
#[derive(Debug)]
pub struct Deframer {
    state: State,
    /// Sliding window of the last [`SYNC_BITS`] symbols.
    window: Vec<f64>,
    window_pos: usize,
    window_filled: usize,
    sync: [f64; SYNC_BITS],
    /// Negate incoming symbols (spectral inversion detected).
    invert: bool,
    scrambler: Scrambler,
    /// Symbols consumed since the last lock, for the stale-inversion rule.
    since_lock: usize,
    frames_seen: u64,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            state: State::Hunt,
            window: vec![0.0; SYNC_BITS],
            window_pos: 0,
            window_filled: 0,
            sync: sync_symbols(),
            invert: false,
            scrambler: Scrambler::new(),
            since_lock: 0,
            frames_seen: 0,
        }
    }

    /// Feed soft symbols; returns every completed frame's descrambled
    /// payload symbols, [`FRAME_CODED_BITS`] each.
    pub fn process(&mut self, symbols: &[f64]) -> Vec<Vec<f64>> {
        let mut frames = Vec::new();
        for &raw in symbols {
            self.since_lock += 1;
            match &mut self.state {
                State::Hunt => {
                    self.window[self.window_pos] = raw;
                    self.window_pos = (self.window_pos + 1) % SYNC_BITS;
                    if self.window_filled < SYNC_BITS {
                        self.window_filled += 1;
                    }
                    if self.window_filled < SYNC_BITS {
                        continue;
                    }

                    let corr = self.correlate();
                    if corr.abs() >= SYNC_THRESHOLD {
                        self.invert = corr < 0.0;
                        self.scrambler.reset();
                        self.state = State::Lock {
                            collected: Vec::with_capacity(FRAME_CODED_BITS),
                        };
                        self.window_filled = 0;
                        trace!(corr, invert = self.invert, "sync lock");
                    } else if self.since_lock > 2 * (SYNC_BITS + FRAME_CODED_BITS) {
                        // Stale lock context: forget the inversion.
                        if self.invert {
                            debug!("sync hunt timed out, clearing inversion");
                        }
                        self.invert = false;
                        self.since_lock = 0;
                    }
                }
                State::Lock { collected } => {
                    let mut sym = if self.invert { -raw } else { raw };
                    if self.scrambler.next_bit() {
                        sym = -sym;
                    }
                    collected.push(sym);
                    if collected.len() == FRAME_CODED_BITS {
                        frames.push(std::mem::take(collected));
                        self.state = State::Hunt;
                        self.since_lock = 0;
                        self.frames_seen += 1;
                    }
                }
            }
        }
        frames
    }

    /// Normalized correlation of the window against the sync pattern.
    fn correlate(&self) -> f64 {
        let mut acc = 0.0;
        for i in 0..SYNC_BITS {
            let sym = self.window[(self.window_pos + i) % SYNC_BITS];
            acc += sym * self.sync[i];
        }
        acc / SYNC_BITS as f64
    }

    /// Whether the last detected sync word arrived inverted.
    pub fn inverted(&self) -> bool {
        self.invert
    }

    /// Frames delivered so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}
