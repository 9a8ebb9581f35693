//! Generic DSP stage runner.
//!
//! Wraps a sample-in / sample-out processor in its own worker thread that
//! blocks on an input stream and publishes to an output stream, so
//! filters like the AGC and the RX lowpass slot into the chain the same
//! way the transmitter and receiver do. The owner stops a stage by
//! stopping its input side and joining; downstream streams are the
//! owner's business, mirroring the shutdown order of the whole pipeline.

use crate::stream::Stream;
use crate::IQSample;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// A worker thread applying a block processor between two streams.
pub struct Stage {
    name: &'static str,
    input: Arc<Stream<IQSample>>,
    worker: Option<JoinHandle<()>>,
}

impl Stage {
    /// Spawn the worker. `process` sees every input buffer in order and
    /// returns the samples to publish downstream.
    pub fn spawn<F>(
        name: &'static str,
        input: Arc<Stream<IQSample>>,
        output: Arc<Stream<IQSample>>,
        mut process: F,
    ) -> Self
    where
        F: FnMut(&[IQSample]) -> Vec<IQSample> + Send + 'static,
    {
        let worker = {
            let input = input.clone();
            thread::Builder::new()
                .name(format!("stage-{name}"))
                .spawn(move || {
                    while let Some(buf) = input.read() {
                        let out = process(&buf);
                        if !out.is_empty() && !output.write(&out) {
                            break;
                        }
                    }
                    debug!(stage = name, "stage worker exiting");
                })
                .expect("spawn stage worker")
        };
        Self {
            name,
            input,
            worker: Some(worker),
        }
    }

    /// Stop the worker: wake it off the input stream and join it.
    pub fn stop(&mut self) {
        self.input.stop_reader();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                debug!(stage = self.name, "stage worker panicked");
            }
        }
        self.input.clear_read_stop();
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_stage_processes_in_order() {
        let input = Arc::new(Stream::new());
        let output = Arc::new(Stream::new());
        let mut stage = Stage::spawn("double", input.clone(), output.clone(), |buf| {
            buf.iter().map(|s| s * 2.0).collect()
        });

        input.write(&[Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)]);
        let out = output.read().unwrap();
        assert_eq!(out[0].re, 2.0);
        assert_eq!(out[1].re, 4.0);

        input.write(&[Complex64::new(3.0, 0.0)]);
        assert_eq!(output.read().unwrap()[0].re, 6.0);

        stage.stop();
    }

    #[test]
    fn test_stage_stop_joins() {
        let input = Arc::new(Stream::new());
        let output = Arc::new(Stream::new());
        let mut stage = Stage::spawn("idle", input.clone(), output, |buf| buf.to_vec());
        // Worker is blocked reading; stop must wake and join it.
        stage.stop();
    }

    #[test]
    fn test_stage_exits_when_output_stopped() {
        let input = Arc::new(Stream::new());
        let output: Arc<Stream<IQSample>> = Arc::new(Stream::new());
        output.stop_writer();
        let mut stage = Stage::spawn("dead-end", input.clone(), output, |buf| buf.to_vec());
        input.write(&[Complex64::new(1.0, 0.0)]);
        // The worker hits the stopped output and exits; stop() then joins
        // without hanging.
        stage.stop();
    }
}
