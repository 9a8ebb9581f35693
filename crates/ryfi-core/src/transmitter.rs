//! Transmit pipeline.
//!
//! Owns the packet queue and a worker thread that turns queued packets
//! into baseband: frame, RS-encode, conv-encode, frame with sync +
//! scramble, pulse-shape, publish. The worker blocks on the queue when
//! idle and on the output stream when the consumer is behind, so the
//! whole TX side is demand-driven with no timers.
//!
//! Shutdown: [`Transmitter::stop`] closes the queue, lets the worker
//! flush the frame in flight, stops the output writer side and joins.

use crate::convolutional::ConvEncoder;
use crate::frame::FrameBuilder;
use crate::framer::Framer;
use crate::packet::{Packet, PacketQueue};
use crate::reed_solomon::rs_encode_blocks;
use crate::rrc::RrcInterpolator;
use crate::stream::Stream;
use crate::IQSample;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// The transmit half of the link.
pub struct Transmitter {
    baudrate: f64,
    samplerate: f64,
    queue: Arc<PacketQueue>,
    out: Arc<Stream<IQSample>>,
    worker: Option<JoinHandle<()>>,
}

impl Transmitter {
    /// Create a transmitter for the given symbol and sample rates. The
    /// DSP does not run until [`Transmitter::start`].
    pub fn new(baudrate: f64, samplerate: f64) -> Self {
        assert!(samplerate > baudrate, "samplerate must exceed baudrate");
        Self {
            baudrate,
            samplerate,
            queue: Arc::new(PacketQueue::new()),
            out: Arc::new(Stream::new()),
            worker: None,
        }
    }

    /// The baseband output stream, to hand to the next stage.
    pub fn output(&self) -> Arc<Stream<IQSample>> {
        self.out.clone()
    }

    /// Queue a packet for transmission. Returns false when the queue is
    /// full and the packet was dropped.
    pub fn send(&self, packet: Packet) -> bool {
        let accepted = self.queue.push(packet);
        if !accepted {
            warn!("transmit queue full, dropping packet");
        }
        accepted
    }

    /// Start the TX worker.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let queue = self.queue.clone();
        let out = self.out.clone();
        let baudrate = self.baudrate;
        let samplerate = self.samplerate;

        let worker = thread::Builder::new()
            .name("ryfi-tx".into())
            .spawn(move || {
                let mut builder = FrameBuilder::new();
                let mut conv = ConvEncoder::new();
                let mut framer = Framer::new();
                let mut interp = RrcInterpolator::new(baudrate, samplerate);

                while let Some(frame) = builder.next_frame(&queue) {
                    let coded = rs_encode_blocks(frame.bytes());
                    let inner = conv.encode_frame(&coded);
                    let symbols = framer.frame_symbols(&inner);
                    let samples = interp.process(&symbols);
                    if !out.write(&samples) {
                        break;
                    }
                }
                debug!("tx worker exiting");
            })
            .expect("spawn tx worker");
        self.worker = Some(worker);
    }

    /// Close the queue, flush the frame in flight and join the worker.
    /// The output stream's writer side comes back armed so a later owner
    /// can reuse it.
    pub fn stop(&mut self) {
        self.queue.close();
        self.out.stop_writer();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.out.clear_write_stop();
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FRAME_CODED_BITS, FRAME_DATA_BYTES};
    use crate::framer::SYNC_BITS;

    #[test]
    fn test_one_packet_one_frame_of_samples() {
        let mut tx = Transmitter::new(250e3, 1e6);
        let out = tx.output();
        tx.start();
        assert!(tx.send(Packet::new(vec![0x42; 100]).unwrap()));

        let samples = out.read().unwrap();
        // One frame of symbols at 4 samples per symbol.
        let symbols = SYNC_BITS + FRAME_CODED_BITS;
        assert_eq!(samples.len(), symbols * 4);
        tx.stop();
    }

    #[test]
    fn test_stop_flushes_and_joins() {
        let mut tx = Transmitter::new(250e3, 1e6);
        let out = tx.output();
        tx.start();
        tx.send(Packet::new(vec![1; 10]).unwrap());
        // Consume the frame so the worker is idle on the queue.
        let _ = out.read().unwrap();
        tx.stop();
        // Worker is gone; nothing more is published.
        out.stop_reader();
        assert!(out.read().is_none());
    }

    #[test]
    fn test_queue_bound_visible_through_send() {
        let tx = Transmitter::new(250e3, 1e6);
        // Worker not started: the queue fills to its bound.
        let mut accepted = 0;
        let mut dropped = 0;
        for i in 0..40 {
            if tx.send(Packet::new(vec![i as u8; 8]).unwrap()) {
                accepted += 1;
            } else {
                dropped += 1;
            }
        }
        assert_eq!(accepted, crate::packet::MAX_QUEUE_SIZE);
        assert_eq!(dropped, 40 - crate::packet::MAX_QUEUE_SIZE);
    }
}
