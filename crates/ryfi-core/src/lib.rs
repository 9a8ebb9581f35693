//! # RyFi Core
//!
//! Baseband DSP and framing for the RyFi IP-over-radio link. This crate
//! turns variable-length IP datagrams into a continuous stream of BPSK
//! symbols and back, with a two-stage FEC stack in between.
//!
//! ## Signal Flow
//!
//! ```text
//! TX: Packet → Queue → FrameBuilder → RS(255,223) → Conv r=1/2 K=7
//!        → Framer (sync + scramble) → RRC interpolator → baseband out
//!
//! RX: baseband in → RRC matched filter → M&M clock recovery
//!        → Deframer (sync hunt + descramble) → Viterbi → RS decode
//!        → FrameParser → packets out
//! ```
//!
//! Stages exchange samples over [`stream::Stream`], a blocking
//! single-producer / single-consumer double-buffered handoff, and run in
//! their own worker threads ([`transmitter::Transmitter`],
//! [`receiver::Receiver`], [`stage::Stage`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use ryfi_core::packet::Packet;
//! use ryfi_core::receiver::Receiver;
//! use ryfi_core::stream::Stream;
//! use ryfi_core::transmitter::Transmitter;
//! use std::sync::Arc;
//!
//! let mut tx = Transmitter::new(720e3, 1.5e6);
//! tx.start();
//! tx.send(Packet::new(b"hello".to_vec()).unwrap());
//!
//! let baseband = Arc::new(Stream::new());
//! let mut rx = Receiver::new(baseband, 720e3, 1.5e6, |pkt| {
//!     println!("got {} bytes", pkt.len());
//! });
//! rx.start();
//! ```

pub mod agc;
pub mod bits;
pub mod clock_recovery;
pub mod convolutional;
pub mod deframer;
pub mod fir;
pub mod frame;
pub mod framer;
pub mod packet;
pub mod receiver;
pub mod reed_solomon;
pub mod rrc;
pub mod scrambler;
pub mod stage;
pub mod stream;
pub mod transmitter;
pub mod viterbi;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// A single complex baseband sample.
pub type IQSample = Complex64;

/// A soft BPSK symbol, nominally in [-1.0, +1.0].
pub type SoftSymbol = f64;

/// Link-level rate parameters shared by both ends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinkParams {
    /// Symbol rate over the air, in baud.
    pub baudrate: f64,
    /// Baseband sample rate of the SDR, in Hz.
    pub samplerate: f64,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            baudrate: 720e3,
            samplerate: 1.5e6,
        }
    }
}

impl LinkParams {
    /// Samples per symbol at the SDR rate.
    pub fn samples_per_symbol(&self) -> f64 {
        self.samplerate / self.baudrate
    }
}
