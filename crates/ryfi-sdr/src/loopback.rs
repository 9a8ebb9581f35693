//! In-process loopback driver.
//!
//! One full-duplex virtual radio, serial `loop0`, whose TX feeds its RX
//! through a bounded int16 ring. Exercises every contract the vendor
//! drivers must honor (context sharing, the idle/running state machine,
//! worker shutdown order, the sample bridge) without hardware, and
//! doubles as a bench link for tests.

use crate::context::ContextTable;
use crate::driver::{DeviceCaps, DeviceInfo, Driver, RxDevice, TxDevice};
use crate::worker::{SampleSink, SampleSource, StreamWorker};
use crate::{SdrError, SdrResult};
use num_complex::Complex64;
use ryfi_core::stream::Stream;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// The driver name used in selectors.
pub const LOOPBACK_DRIVER_NAME: &str = "loopback";

const LOOPBACK_SERIAL: &str = "loop0";

/// Ring capacity in int16 values (several frames of headroom).
const RING_CAPACITY: usize = 1 << 22;

/// Samples per hardware buffer on the RX side.
const RX_BUFFER_SAMPLES: usize = 16384;

/// The "hardware": a bounded ring of interleaved I/Q int16.
pub struct LoopbackContext {
    ring: Mutex<VecDeque<i16>>,
    readable: Condvar,
    writable: Condvar,
}

impl LoopbackContext {
    fn new() -> Self {
        Self {
            ring: Mutex::new(VecDeque::new()),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    fn read(&self, buf: &mut [i16], timeout: Duration) -> SdrResult<usize> {
        let mut ring = self.ring.lock().unwrap();
        // Wait for at least one whole I/Q pair.
        while ring.len() < 2 {
            let (guard, res) = self.readable.wait_timeout(ring, timeout).unwrap();
            ring = guard;
            if res.timed_out() && ring.len() < 2 {
                return Err(SdrError::Timeout);
            }
        }
        let take = buf.len().min(ring.len()) & !1;
        for v in buf.iter_mut().take(take) {
            *v = ring.pop_front().unwrap();
        }
        self.writable.notify_all();
        Ok(take / 2)
    }

    fn write(&self, buf: &[i16], timeout: Duration) -> SdrResult<()> {
        let mut ring = self.ring.lock().unwrap();
        while ring.len() + buf.len() > RING_CAPACITY {
            let (guard, res) = self.writable.wait_timeout(ring, timeout).unwrap();
            ring = guard;
            if res.timed_out() && ring.len() + buf.len() > RING_CAPACITY {
                return Err(SdrError::Timeout);
            }
        }
        ring.extend(buf.iter().copied());
        self.readable.notify_all();
        Ok(())
    }
}

struct Inner {
    contexts: ContextTable<LoopbackContext>,
}

/// The loopback driver.
pub struct LoopbackDriver {
    inner: Arc<Inner>,
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                contexts: ContextTable::new(),
            }),
        }
    }

    /// Context refcount for a serial; device-sharing tests peek at this.
    pub fn context_refcount(&self, identifier: &str) -> usize {
        self.inner.contexts.refcount(identifier)
    }
}

impl Driver for LoopbackDriver {
    fn list(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            caps: DeviceCaps {
                receive: true,
                transmit: true,
            },
            driver: LOOPBACK_DRIVER_NAME.to_string(),
            identifier: LOOPBACK_SERIAL.to_string(),
        }]
    }

    fn open_rx(&self, identifier: &str) -> SdrResult<Box<dyn RxDevice>> {
        if identifier != LOOPBACK_SERIAL {
            return Err(SdrError::InvalidIdentifier(identifier.to_string()));
        }
        let ctx = self
            .inner
            .contexts
            .acquire(identifier, || Ok(LoopbackContext::new()))?;
        Ok(Box::new(LoopbackRx {
            inner: self.inner.clone(),
            identifier: identifier.to_string(),
            ctx,
            output: Arc::new(Stream::new()),
            worker: None,
        }))
    }

    fn open_tx(
        &self,
        identifier: &str,
        input: Arc<Stream<Complex64>>,
    ) -> SdrResult<Box<dyn TxDevice>> {
        if identifier != LOOPBACK_SERIAL {
            return Err(SdrError::InvalidIdentifier(identifier.to_string()));
        }
        let ctx = self
            .inner
            .contexts
            .acquire(identifier, || Ok(LoopbackContext::new()))?;
        Ok(Box::new(LoopbackTx {
            inner: self.inner.clone(),
            identifier: identifier.to_string(),
            ctx,
            input,
            worker: None,
        }))
    }
}

struct ContextSource(Arc<LoopbackContext>);

impl SampleSource for ContextSource {
    fn read(&mut self, buf: &mut [i16], timeout: Duration) -> SdrResult<usize> {
        self.0.read(buf, timeout)
    }
}

struct ContextSink(Arc<LoopbackContext>);

impl SampleSink for ContextSink {
    fn write(&mut self, buf: &[i16], timeout: Duration) -> SdrResult<()> {
        self.0.write(buf, timeout)
    }
}

struct LoopbackRx {
    inner: Arc<Inner>,
    identifier: String,
    ctx: Arc<LoopbackContext>,
    output: Arc<Stream<Complex64>>,
    worker: Option<StreamWorker>,
}

impl RxDevice for LoopbackRx {
    fn tune(&mut self, _freq: f64) -> SdrResult<()> {
        Ok(())
    }

    fn set_samplerate(&mut self, _rate: f64) -> SdrResult<()> {
        if self.worker.is_some() {
            return Err(SdrError::Running);
        }
        Ok(())
    }

    fn set_bandwidth(&mut self, _bw: f64) -> SdrResult<()> {
        Ok(())
    }

    fn start(&mut self) -> SdrResult<()> {
        if self.worker.is_some() {
            return Err(SdrError::Running);
        }
        self.worker = Some(StreamWorker::spawn_rx(
            Box::new(ContextSource(self.ctx.clone())),
            self.output.clone(),
            RX_BUFFER_SAMPLES,
        ));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn output(&self) -> Arc<Stream<Complex64>> {
        self.output.clone()
    }
}

impl Drop for LoopbackRx {
    fn drop(&mut self) {
        self.stop();
        self.inner.contexts.release(&self.identifier, |_| {});
    }
}

struct LoopbackTx {
    inner: Arc<Inner>,
    identifier: String,
    ctx: Arc<LoopbackContext>,
    input: Arc<Stream<Complex64>>,
    worker: Option<StreamWorker>,
}

impl TxDevice for LoopbackTx {
    fn tune(&mut self, _freq: f64) -> SdrResult<()> {
        Ok(())
    }

    fn set_samplerate(&mut self, _rate: f64) -> SdrResult<()> {
        if self.worker.is_some() {
            return Err(SdrError::Running);
        }
        Ok(())
    }

    fn start(&mut self) -> SdrResult<()> {
        if self.worker.is_some() {
            return Err(SdrError::Running);
        }
        self.worker = Some(StreamWorker::spawn_tx(
            Box::new(ContextSink(self.ctx.clone())),
            self.input.clone(),
        ));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

impl Drop for LoopbackTx {
    fn drop(&mut self) {
        self.stop();
        self.inner.contexts.release(&self.identifier, |_| {});
    }
}
