//! Hardware streaming workers.
//!
//! One thread per direction per device, doing exactly three things: block
//! on the hardware for one buffer, convert between int16 and complex
//! float, and push/pull the DSP stream. Hardware calls use a fixed
//! synchronous timeout; a timeout is logged and retried, never fatal.
//! Shutdown follows the strict order: signal the DSP stream, join the
//! thread, and only then does the owner disable the hardware channel.

use crate::bridge::{complex_to_int16, int16_to_complex};
use crate::{SdrError, SdrResult};
use num_complex::Complex64;
use ryfi_core::stream::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Synchronous hardware call timeout.
pub const HW_TIMEOUT: Duration = Duration::from_millis(3500);

/// Blocking read access to RX hardware.
pub trait SampleSource: Send {
    /// Fill `buf` with interleaved I/Q, waiting at most `timeout`.
    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> SdrResult<usize>;
}

/// Blocking write access to TX hardware.
pub trait SampleSink: Send {
    /// Push interleaved I/Q to the hardware, waiting at most `timeout`.
    fn write(&mut self, buf: &[i16], timeout: Duration) -> SdrResult<()>;
}

/// A joined-on-stop worker thread for either direction.
pub struct StreamWorker {
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Which side of which stream to signal on stop.
    signal: StopSignal,
}

enum StopSignal {
    WriterOf(Arc<Stream<Complex64>>),
    ReaderOf(Arc<Stream<Complex64>>),
}

impl StreamWorker {
    /// Spawn the RX pump: hardware → convert → stream.
    pub fn spawn_rx(
        mut source: Box<dyn SampleSource>,
        output: Arc<Stream<Complex64>>,
        buffer_samples: usize,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = {
            let output = output.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("sdr-rx".into())
                .spawn(move || {
                    let mut raw = vec![0i16; buffer_samples * 2];
                    while !shutdown.load(Ordering::Acquire) {
                        let count = match source.read(&mut raw, HW_TIMEOUT) {
                            Ok(count) => count,
                            Err(SdrError::Timeout) => {
                                warn!("RX hardware read timed out, retrying");
                                continue;
                            }
                            Err(err) => {
                                warn!(%err, "RX hardware read failed, worker exiting");
                                break;
                            }
                        };
                        if count == 0 {
                            continue;
                        }
                        let samples = int16_to_complex(&raw[..count * 2]);
                        if !output.write(&samples) {
                            break;
                        }
                    }
                    debug!("RX stream worker exiting");
                })
                .expect("spawn RX stream worker")
        };
        Self {
            thread: Some(thread),
            shutdown,
            signal: StopSignal::WriterOf(output),
        }
    }

    /// Spawn the TX pump: stream → convert → hardware.
    pub fn spawn_tx(mut sink: Box<dyn SampleSink>, input: Arc<Stream<Complex64>>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = {
            let input = input.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name("sdr-tx".into())
                .spawn(move || {
                    while !shutdown.load(Ordering::Acquire) {
                        let Some(samples) = input.read() else { break };
                        let raw = complex_to_int16(&samples);
                        loop {
                            match sink.write(&raw, HW_TIMEOUT) {
                                Ok(()) => break,
                                Err(SdrError::Timeout) => {
                                    warn!("TX hardware write timed out, retrying");
                                    if shutdown.load(Ordering::Acquire) {
                                        break;
                                    }
                                }
                                Err(err) => {
                                    warn!(%err, "TX hardware write failed, worker exiting");
                                    return;
                                }
                            }
                        }
                    }
                    debug!("TX stream worker exiting");
                })
                .expect("spawn TX stream worker")
        };
        Self {
            thread: Some(thread),
            shutdown,
            signal: StopSignal::ReaderOf(input),
        }
    }

    /// Signal the stream side the worker blocks on, then join it. The
    /// stream is re-armed afterwards so a restart can reuse it.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        match &self.signal {
            StopSignal::WriterOf(stream) => stream.stop_writer(),
            StopSignal::ReaderOf(stream) => stream.stop_reader(),
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        match &self.signal {
            StopSignal::WriterOf(stream) => stream.clear_write_stop(),
            StopSignal::ReaderOf(stream) => stream.clear_read_stop(),
        }
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Hardware stand-in producing a fixed ramp.
    struct RampSource {
        next: i16,
    }

    impl SampleSource for RampSource {
        fn read(&mut self, buf: &mut [i16], _timeout: Duration) -> SdrResult<usize> {
            for v in buf.iter_mut() {
                *v = self.next;
                self.next = self.next.wrapping_add(1);
            }
            Ok(buf.len() / 2)
        }
    }

    struct CollectSink {
        seen: Arc<Mutex<Vec<i16>>>,
    }

    impl SampleSink for CollectSink {
        fn write(&mut self, buf: &[i16], _timeout: Duration) -> SdrResult<()> {
            self.seen.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }
    }

    /// Times out a few times before delivering, like a slow radio.
    struct FlakySource {
        timeouts_left: usize,
    }

    impl SampleSource for FlakySource {
        fn read(&mut self, buf: &mut [i16], _timeout: Duration) -> SdrResult<usize> {
            if self.timeouts_left > 0 {
                self.timeouts_left -= 1;
                return Err(SdrError::Timeout);
            }
            buf.fill(2048);
            Ok(buf.len() / 2)
        }
    }

    #[test]
    fn test_rx_worker_converts_and_publishes() {
        let output = Arc::new(Stream::new());
        let mut worker =
            StreamWorker::spawn_rx(Box::new(RampSource { next: 0 }), output.clone(), 64);

        let buf = output.read().unwrap();
        assert_eq!(buf.len(), 64);
        assert!((buf[0].re - 0.0).abs() < 1e-9);
        assert!((buf[0].im - 1.0 / 2048.0).abs() < 1e-9);

        worker.stop();
    }

    #[test]
    fn test_rx_worker_survives_timeouts() {
        let output = Arc::new(Stream::new());
        let mut worker = StreamWorker::spawn_rx(
            Box::new(FlakySource { timeouts_left: 3 }),
            output.clone(),
            16,
        );
        let buf = output.read().unwrap();
        assert!((buf[0].re - 1.0).abs() < 1e-9);
        worker.stop();
    }

    #[test]
    fn test_tx_worker_drains_stream() {
        let input = Arc::new(Stream::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut worker =
            StreamWorker::spawn_tx(Box::new(CollectSink { seen: seen.clone() }), input.clone());

        assert!(input.write(&[Complex64::new(1.0, -1.0)]));
        assert!(input.write(&[Complex64::new(0.5, 0.0)]));
        // Second write returning means the first buffer was consumed.
        worker.stop();

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 2);
        assert_eq!(seen[0], 2048);
        assert_eq!(seen[1], -2048);
    }

    #[test]
    fn test_stop_idle_worker() {
        let input: Arc<Stream<Complex64>> = Arc::new(Stream::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut worker = StreamWorker::spawn_tx(Box::new(CollectSink { seen }), input);
        // Blocked on an empty stream; stop must wake and join.
        worker.stop();
    }
}
