//! Blocking single-producer / single-consumer sample streams.
//!
//! Every DSP stage owns one worker thread and borrows two of these: it
//! blocks reading its input stream and blocks publishing to its output
//! stream. The handoff is double-buffered: the producer fills its own
//! buffer and publishes it with [`Stream::write`], which blocks until the
//! consumer has taken the previous publication; the consumer takes a whole
//! publication at a time with [`Stream::read`]. There is no polling
//! anywhere, only condition-variable wake-ups: busy waiting would wreck
//! pulse timing.
//!
//! Cancellation is explicit and side-specific: [`Stream::stop_reader`]
//! wakes a blocked consumer and makes every later `read` return `None`;
//! [`Stream::stop_writer`] wakes a blocked producer and makes every later
//! `write` return `false`. Workers treat the sentinel as "exit now". The
//! matching `clear_*` calls re-arm a stream for reuse after a restart.
//!
//! ## Example
//!
//! ```rust
//! use ryfi_core::stream::Stream;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let stream = Arc::new(Stream::new());
//! let consumer = {
//!     let stream = stream.clone();
//!     thread::spawn(move || {
//!         let mut total = 0;
//!         while let Some(buf) = stream.read() {
//!             total += buf.len();
//!         }
//!         total
//!     })
//! };
//!
//! assert!(stream.write(&[1.0f64, 2.0, 3.0]));
//! stream.stop_reader();
//! assert!(consumer.join().unwrap() <= 3);
//! ```

use std::sync::{Condvar, Mutex};

#[derive(Debug)]
struct Shared<T> {
    /// The published buffer, waiting for the consumer.
    pending: Option<Vec<T>>,
    read_stop: bool,
    write_stop: bool,
}

/// A double-buffered SPSC sample stream.
#[derive(Debug)]
pub struct Stream<T> {
    shared: Mutex<Shared<T>>,
    /// Signaled when a buffer is published or the reader is stopped.
    readable: Condvar,
    /// Signaled when the pending buffer is consumed or the writer stopped.
    writable: Condvar,
}

impl<T: Clone> Default for Stream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Stream<T> {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                pending: None,
                read_stop: false,
                write_stop: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Publish a buffer, blocking until the consumer has taken the
    /// previous one. Returns false once the writer side is stopped; the
    /// buffer is then discarded.
    pub fn write(&self, data: &[T]) -> bool {
        let mut shared = self.shared.lock().unwrap();
        while shared.pending.is_some() && !shared.write_stop {
            shared = self.writable.wait(shared).unwrap();
        }
        if shared.write_stop {
            return false;
        }
        shared.pending = Some(data.to_vec());
        self.readable.notify_one();
        true
    }

    /// Take the next published buffer, blocking until one arrives.
    /// Returns `None` once the reader side is stopped.
    pub fn read(&self) -> Option<Vec<T>> {
        let mut shared = self.shared.lock().unwrap();
        loop {
            if shared.read_stop {
                return None;
            }
            if let Some(buf) = shared.pending.take() {
                self.writable.notify_one();
                return Some(buf);
            }
            shared = self.readable.wait(shared).unwrap();
        }
    }

    /// Discard any unconsumed publication and release a blocked writer.
    pub fn flush(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.pending = None;
        self.writable.notify_one();
    }

    /// Wake the consumer and make every subsequent `read` return `None`.
    pub fn stop_reader(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.read_stop = true;
        self.readable.notify_all();
    }

    /// Wake the producer and make every subsequent `write` return false.
    pub fn stop_writer(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.write_stop = true;
        self.writable.notify_all();
    }

    /// Re-arm the reader side after a stop.
    pub fn clear_read_stop(&self) {
        self.shared.lock().unwrap().read_stop = false;
    }

    /// Re-arm the writer side after a stop.
    pub fn clear_write_stop(&self) {
        self.shared.lock().unwrap().write_stop = false;
    }
}
