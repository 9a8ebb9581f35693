//! Packets and the bounded transmit queue.
//!
//! A [`Packet`] is an opaque IP datagram handed to the link by the host
//! side. Ordering is FIFO within one sender; there is no identifier, no
//! priority and no retransmission. The [`PacketQueue`] is the only
//! buffering point between the host and the frame builder: a bounded FIFO
//! guarded by a mutex and a condition variable, dropping the newest packet
//! on overflow.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Largest payload a single packet may carry: 16 KiB minus the 2-byte
/// length header it costs inside a frame.
pub const MAX_CONTENT_SIZE: usize = 16384 - 2;

/// Most packets the transmit queue will hold before dropping.
pub const MAX_QUEUE_SIZE: usize = 32;

/// An opaque datagram payload, 1..=[`MAX_CONTENT_SIZE`] bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
}

impl Packet {
    /// Wrap a payload. Returns `None` when the payload is empty or larger
    /// than [`MAX_CONTENT_SIZE`].
    pub fn new(data: Vec<u8>) -> Option<Self> {
        if data.is_empty() || data.len() > MAX_CONTENT_SIZE {
            return None;
        }
        Some(Self { data })
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false: empty packets cannot be constructed.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the packet, returning the payload.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Serialize as the on-air tuple `[len16 LE][payload]`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        out.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

#[derive(Debug, Default)]
struct QueueState {
    packets: VecDeque<Packet>,
    closed: bool,
}

/// Bounded FIFO between the host side and the TX worker.
///
/// `push` never blocks: at capacity the offered packet is rejected and the
/// caller decides what to log. `pop` blocks until a packet arrives or the
/// queue is closed; after `close`, remaining packets still drain in order
/// and `pop` then returns `None` forever.
#[derive(Debug, Default)]
pub struct PacketQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a packet. Returns false (packet dropped) when the queue is
    /// full or already closed.
    pub fn push(&self, packet: Packet) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.closed || state.packets.len() >= MAX_QUEUE_SIZE {
            return false;
        }
        state.packets.push_back(packet);
        self.available.notify_one();
        true
    }

    /// Dequeue the oldest packet, blocking until one is available. Returns
    /// `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Packet> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(packet) = state.packets.pop_front() {
                return Some(packet);
            }
            if state.closed {
                return None;
            }
            state = self.available.wait(state).unwrap();
        }
    }

    /// Dequeue without blocking. `None` means empty (or closed and drained).
    pub fn try_pop(&self) -> Option<Packet> {
        self.state.lock().unwrap().packets.pop_front()
    }

    /// Close the queue, waking any blocked `pop`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.available.notify_all();
    }

    /// Number of queued packets.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().packets.len()
    }

    /// Whether the queue currently holds no packets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
