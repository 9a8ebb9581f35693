//! Receive pipeline.
//!
//! One worker thread runs the whole chain from baseband samples to
//! delivered packets: RRC matched filter, Mueller & Müller timing
//! recovery, sync-word deframing, Viterbi, RS decoding and packet
//! reassembly. Completed packets go to the `on_packet` callback in
//! arrival order.
//!
//! A frame with any uncorrectable RS block is handed to the reassembler
//! as corrupt: whatever packet was mid-assembly is dropped and parsing
//! resumes at the next frame's cursor, so the damage never spreads past
//! the packets whose bytes the frame carried.

use crate::deframer::Deframer;
use crate::fir::FirFilter;
use crate::frame::{FrameParser, RxFrame};
use crate::packet::Packet;
use crate::reed_solomon::rs_decode_blocks;
use crate::rrc::{rrc_taps, RRC_ROLLOFF, RRC_SPAN_SYMBOLS};
use crate::stream::Stream;
use crate::viterbi::ViterbiDecoder;
use crate::IQSample;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type PacketHandler = Box<dyn FnMut(Packet) + Send>;

/// The receive half of the link.
pub struct Receiver {
    baudrate: f64,
    samplerate: f64,
    input: Arc<Stream<IQSample>>,
    handler: Option<PacketHandler>,
    worker: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Create a receiver reading baseband from `input`. Every reassembled
    /// packet is delivered to `on_packet` from the worker thread.
    pub fn new<F>(input: Arc<Stream<IQSample>>, baudrate: f64, samplerate: f64, on_packet: F) -> Self
    where
        F: FnMut(Packet) + Send + 'static,
    {
        assert!(samplerate > baudrate, "samplerate must exceed baudrate");
        Self {
            baudrate,
            samplerate,
            input,
            handler: Some(Box::new(on_packet)),
            worker: None,
        }
    }

    /// Start the RX worker.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        let mut handler = self.handler.take().expect("receiver already started once");
        let input = self.input.clone();
        let sps = self.samplerate / self.baudrate;

        let worker = thread::Builder::new()
            .name("ryfi-rx".into())
            .spawn(move || {
                // Matched filter normalized to unity DC gain, so symbol
                // peaks land near ±1 for the correlator and the decoder.
                let mut taps = rrc_taps(RRC_ROLLOFF, RRC_SPAN_SYMBOLS, sps);
                let dc: f64 = taps.iter().sum();
                for t in taps.iter_mut() {
                    *t /= dc;
                }
                let mut matched = FirFilter::new(taps);
                let mut timing = crate::clock_recovery::ClockRecovery::new(sps, 0.01);
                let mut deframer = Deframer::new();
                let viterbi = ViterbiDecoder::new();
                let mut parser = FrameParser::new();

                while let Some(buf) = input.read() {
                    let filtered = matched.process_block(&buf);
                    let real: Vec<f64> = filtered.iter().map(|s| s.re).collect();
                    let soft = timing.process(&real);

                    for frame_symbols in deframer.process(&soft) {
                        let mut coded = viterbi.decode_frame(&frame_symbols);
                        let rx_frame = match rs_decode_blocks(&mut coded) {
                            Ok((data, corrected)) => {
                                if corrected > 0 {
                                    debug!(corrected, "RS corrected byte errors");
                                }
                                RxFrame::Ok(data)
                            }
                            Err(_) => {
                                warn!("uncorrectable frame, dropping");
                                RxFrame::Corrupt
                            }
                        };
                        for packet in parser.push_frame(rx_frame) {
                            handler(packet);
                        }
                    }
                }
                debug!("rx worker exiting");
            })
            .expect("spawn rx worker");
        self.worker = Some(worker);
    }

    /// Wake the worker off the input stream and join it.
    pub fn stop(&mut self) {
        self.input.stop_reader();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.input.clear_read_stop();
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}
