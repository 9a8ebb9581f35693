//! Fixed-size carrier frames: builder (TX) and parser/reassembler (RX).
//!
//! A frame is always [`FRAME_DATA_BYTES`] long and opens with a 2-byte
//! little-endian cursor: the in-frame offset where the next packet tuple
//! `[len16 LE][payload]` begins, or [`COUNTER_NONE`] when the whole frame
//! continues a packet begun earlier. Packets split at arbitrary byte
//! positions (even mid-header) and the tail pads with zeros, which the
//! parser recognizes because packets are never zero-length.
//!
//! The builder never emits a short frame: with nothing at all to send it
//! blocks on the packet queue instead. Once data flows, every emitted
//! frame is full and link occupancy is 100%.
//!
//! The parser is the mirror image plus damage control: a corrupt frame
//! abandons any half-assembled packet, and the next frame's cursor says
//! exactly where clean parsing resumes, so one lost frame never takes
//! down more than the packets whose bytes it carried.

use crate::packet::{Packet, PacketQueue, MAX_CONTENT_SIZE};
use crate::reed_solomon::RS_K;
use tracing::{debug, warn};

/// RS codewords per frame.
pub const RS_BLOCKS_PER_FRAME: usize = 9;

/// Frame size before FEC: an exact number of RS data blocks.
pub const FRAME_DATA_BYTES: usize = RS_BLOCKS_PER_FRAME * RS_K;

/// Frame size after the RS outer code.
pub const FRAME_CODED_BYTES: usize = RS_BLOCKS_PER_FRAME * 255;

/// Frame size after the rate-1/2 inner code.
pub const FRAME_CONV_BYTES: usize = FRAME_CODED_BYTES * 2;

/// Conv-coded payload bits per frame, i.e. soft symbols between sync words.
pub const FRAME_CODED_BITS: usize = FRAME_CONV_BYTES * 8;

/// Cursor value meaning "no packet starts in this frame".
pub const COUNTER_NONE: u16 = 0xFFFF;

/// One pre-FEC frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap raw frame bytes.
    ///
    /// # Panics
    ///
    /// Panics unless `bytes` is exactly [`FRAME_DATA_BYTES`] long.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        assert_eq!(bytes.len(), FRAME_DATA_BYTES, "bad frame size");
        Self { bytes }
    }

    /// The packet-boundary cursor.
    pub fn counter(&self) -> u16 {
        u16::from_le_bytes([self.bytes[0], self.bytes[1]])
    }

    /// The full frame contents, cursor included.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Builder (TX)
// ---------------------------------------------------------------------------

/// Packs the packet stream into fixed-size frames without gaps.
#[derive(Debug, Default)]
pub struct FrameBuilder {
    /// Serialized bytes of a packet that overflowed the previous frame.
    carry: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the next full frame from `queue`.
    ///
    /// Blocks on the queue only when there is nothing at all to pack.
    /// Returns `None` once the queue is closed and every byte, including
    /// any split remainder, has been emitted.
    pub fn next_frame(&mut self, queue: &PacketQueue) -> Option<Frame> {
        let mut buf = vec![0u8; FRAME_DATA_BYTES];
        let mut pos = 2usize;

        // Finish the packet split at the previous frame boundary.
        let take = self.carry.len().min(FRAME_DATA_BYTES - pos);
        buf[pos..pos + take].copy_from_slice(&self.carry[..take]);
        self.carry.drain(..take);
        pos += take;

        // Where the first fresh packet header lands. A counter pointing
        // at a pad tail is fine: the parser stops at the zero length
        // field there.
        let counter = if self.carry.is_empty() && pos < FRAME_DATA_BYTES {
            pos as u16
        } else {
            COUNTER_NONE
        };

        let mut have_data = take > 0;
        while pos < FRAME_DATA_BYTES {
            // Block only for the first byte of an otherwise empty frame;
            // with data already in hand, an empty queue means pad and ship.
            let packet = if have_data {
                match queue.try_pop() {
                    Some(p) => p,
                    None => break,
                }
            } else {
                match queue.pop() {
                    Some(p) => p,
                    None => break,
                }
            };
            have_data = true;

            let tuple = packet.serialize();
            let space = FRAME_DATA_BYTES - pos;
            if tuple.len() <= space {
                buf[pos..pos + tuple.len()].copy_from_slice(&tuple);
                pos += tuple.len();
            } else {
                buf[pos..].copy_from_slice(&tuple[..space]);
                self.carry = tuple[space..].to_vec();
                pos = FRAME_DATA_BYTES;
            }
        }

        if !have_data {
            // Queue closed with nothing left over.
            return None;
        }

        buf[..2].copy_from_slice(&counter.to_le_bytes());
        Some(Frame::from_bytes(buf))
    }

    /// Whether a split packet is still waiting for its next frame.
    pub fn has_carry(&self) -> bool {
        !self.carry.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parser / reassembler (RX)
// ---------------------------------------------------------------------------

/// A decoded frame as seen by the parser: either intact or known-corrupt
/// (any RS block uncorrectable).
#[derive(Debug, Clone)]
pub enum RxFrame {
    Ok(Vec<u8>),
    Corrupt,
}

/// Reassembles packets from the decoded frame stream.
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Serialized bytes (header first) of the packet being reassembled.
    pending: Option<Vec<u8>>,
    /// Set after a corrupt frame: ignore continuation bytes until a frame
    /// announces a fresh packet start.
    resync: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame; completed packets come back in order.
    pub fn push_frame(&mut self, frame: RxFrame) -> Vec<Packet> {
        let bytes = match frame {
            RxFrame::Ok(bytes) => bytes,
            RxFrame::Corrupt => {
                if self.pending.take().is_some() {
                    debug!("dropping reassembly state after corrupt frame");
                }
                self.resync = true;
                return Vec::new();
            }
        };
        assert_eq!(bytes.len(), FRAME_DATA_BYTES, "bad frame size");

        let counter = u16::from_le_bytes([bytes[0], bytes[1]]);
        let mut packets = Vec::new();

        if counter != COUNTER_NONE
            && !(2..FRAME_DATA_BYTES).contains(&(counter as usize))
        {
            warn!(counter, "implausible frame counter, skipping frame");
            self.pending = None;
            self.resync = true;
            return packets;
        }

        if self.resync {
            // Skip the continuation region entirely; it belongs to a
            // packet we never saw the start of.
            if counter == COUNTER_NONE {
                return packets;
            }
            self.resync = false;
            self.walk_tuples(&bytes, counter as usize, &mut packets);
            return packets;
        }

        match self.pending.take() {
            Some(mut pending) => {
                let cont_end = if counter == COUNTER_NONE {
                    FRAME_DATA_BYTES
                } else {
                    counter as usize
                };
                pending.extend_from_slice(&bytes[2..cont_end]);

                match tuple_total_len(&pending) {
                    Some(total) if total == pending.len() => {
                        // The continuation region ends exactly where the
                        // packet does.
                        if let Some(pkt) = finish_tuple(pending) {
                            packets.push(pkt);
                        }
                        if counter != COUNTER_NONE {
                            self.walk_tuples(&bytes, counter as usize, &mut packets);
                        }
                    }
                    Some(total) if total < pending.len() => {
                        warn!("continuation overruns packet, resyncing");
                        if counter != COUNTER_NONE {
                            self.walk_tuples(&bytes, counter as usize, &mut packets);
                        } else {
                            self.resync = true;
                        }
                    }
                    _ => {
                        // Still incomplete.
                        if counter == COUNTER_NONE {
                            self.pending = Some(pending);
                        } else {
                            // The sender says a fresh packet starts here,
                            // so the leftover cannot be real data.
                            debug!("incomplete continuation, resyncing at counter");
                            self.walk_tuples(&bytes, counter as usize, &mut packets);
                        }
                    }
                }
            }
            None => {
                if counter == COUNTER_NONE {
                    // Continuation of a packet we are not assembling.
                    return packets;
                }
                self.walk_tuples(&bytes, counter as usize, &mut packets);
            }
        }

        packets
    }

    /// Read `[len16][payload]` tuples from `pos` to the end of the frame.
    fn walk_tuples(&mut self, bytes: &[u8], mut pos: usize, packets: &mut Vec<Packet>) {
        while pos < FRAME_DATA_BYTES {
            let remaining = FRAME_DATA_BYTES - pos;
            if remaining == 1 {
                // Could be a split header or a single pad byte; the next
                // frame's counter settles it.
                self.pending = Some(bytes[pos..].to_vec());
                return;
            }

            let len = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]) as usize;
            if len == 0 {
                // Pad region.
                return;
            }
            if len > MAX_CONTENT_SIZE {
                warn!(len, "implausible packet length, abandoning frame tail");
                return;
            }

            let total = 2 + len;
            if total <= remaining {
                let payload = bytes[pos + 2..pos + total].to_vec();
                if let Some(pkt) = Packet::new(payload) {
                    packets.push(pkt);
                }
                pos += total;
            } else {
                self.pending = Some(bytes[pos..].to_vec());
                return;
            }
        }
    }

    /// Whether a packet is mid-reassembly.
    pub fn in_progress(&self) -> bool {
        self.pending.is_some()
    }
}

/// Total serialized length of a tuple, once enough header bytes exist.
fn tuple_total_len(tuple: &[u8]) -> Option<usize> {
    if tuple.len() < 2 {
        return None;
    }
    Some(2 + u16::from_le_bytes([tuple[0], tuple[1]]) as usize)
}

/// Turn a fully assembled tuple into a packet, discarding pad artifacts.
fn finish_tuple(tuple: Vec<u8>) -> Option<Packet> {
    let len = u16::from_le_bytes([tuple[0], tuple[1]]) as usize;
    if len == 0 || len > MAX_CONTENT_SIZE {
        return None;
    }
    Packet::new(tuple[2..2 + len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn build_all(packets: Vec<Packet>) -> Vec<Frame> {
        let queue = Arc::new(PacketQueue::new());
        for p in packets {
            assert!(queue.push(p));
        }
        queue.close();
        let mut builder = FrameBuilder::new();
        let mut frames = Vec::new();
        while let Some(f) = builder.next_frame(&queue) {
            frames.push(f);
        }
        frames
    }

    fn parse_all(frames: &[Frame]) -> Vec<Packet> {
        let mut parser = FrameParser::new();
        let mut out = Vec::new();
        for f in frames {
            out.extend(parser.push_frame(RxFrame::Ok(f.bytes().to_vec())));
        }
        out
    }

    #[test]
    fn test_frame_geometry() {
        assert_eq!(FRAME_DATA_BYTES, 2007);
        assert_eq!(FRAME_CODED_BYTES, 2295);
        assert_eq!(FRAME_CONV_BYTES, 4590);
        assert_eq!(FRAME_CODED_BITS, 36720);
    }

    #[test]
    fn test_single_small_packet() {
        let pkt = Packet::new((0..64u8).collect()).unwrap();
        let frames = build_all(vec![pkt.clone()]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].bytes().len(), FRAME_DATA_BYTES);
        assert_eq!(frames[0].counter(), 2);
        assert_eq!(parse_all(&frames), vec![pkt]);
    }

    #[test]
    fn test_many_packets_coalesce() {
        let packets: Vec<Packet> = (0..10)
            .map(|i| Packet::new(vec![i as u8; 150]).unwrap())
            .collect();
        let frames = build_all(packets.clone());
        // 10 * 152 = 1520 bytes of tuples fits one frame.
        assert_eq!(frames.len(), 1);
        assert_eq!(parse_all(&frames), packets);
    }

    #[test]
    fn test_large_packet_fragments() {
        let pkt = Packet::new((0..16000).map(|i| (i % 251) as u8).collect()).unwrap();
        let frames = build_all(vec![pkt.clone()]);
        assert_eq!(
            frames.len(),
            (2 + 16000 + (FRAME_DATA_BYTES - 2) - 1) / (FRAME_DATA_BYTES - 2)
        );
        // Every middle frame is pure continuation.
        for f in &frames[1..frames.len() - 1] {
            assert_eq!(f.counter(), COUNTER_NONE);
        }
        assert_eq!(parse_all(&frames), vec![pkt]);
    }

    #[test]
    fn test_split_then_fresh_packet() {
        // First packet overflows frame 1; second starts mid-frame 2.
        let big = Packet::new(vec![0xAA; 2500]).unwrap();
        let small = Packet::new(vec![0xBB; 40]).unwrap();
        let frames = build_all(vec![big.clone(), small.clone()]);
        assert_eq!(frames.len(), 2);
        let remainder = (2 + 2500) - (FRAME_DATA_BYTES - 2);
        assert_eq!(frames[1].counter() as usize, 2 + remainder);
        assert_eq!(parse_all(&frames), vec![big, small]);
    }

    #[test]
    fn test_header_split_across_frames() {
        // Fill so exactly one byte of the next header fits in frame 1.
        let filler_len = FRAME_DATA_BYTES - 2 - 2 - 1;
        let filler = Packet::new(vec![0x11; filler_len]).unwrap();
        let tail = Packet::new(vec![0x22; 300]).unwrap();
        let frames = build_all(vec![filler.clone(), tail.clone()]);
        assert_eq!(frames.len(), 2);
        assert_eq!(parse_all(&frames), vec![filler, tail]);
    }

    #[test]
    fn test_exact_frame_fill() {
        // Tuple fills the frame payload to the byte.
        let pkt = Packet::new(vec![0x7E; FRAME_DATA_BYTES - 4]).unwrap();
        let next = Packet::new(vec![0x5A; 10]).unwrap();
        let frames = build_all(vec![pkt.clone(), next.clone()]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].counter(), 2);
        assert_eq!(parse_all(&frames), vec![pkt, next]);
    }

    #[test]
    fn test_continuation_fills_whole_frame() {
        // Remainder ends exactly at the end of frame 2.
        let len = (FRAME_DATA_BYTES - 2) + (FRAME_DATA_BYTES - 2) - 2;
        let pkt = Packet::new(vec![0x3C; len]).unwrap();
        let after = Packet::new(vec![0x99; 25]).unwrap();
        let frames = build_all(vec![pkt.clone(), after.clone()]);
        assert_eq!(frames[1].counter(), COUNTER_NONE);
        assert_eq!(frames[2].counter(), 2);
        assert_eq!(parse_all(&frames), vec![pkt, after]);
    }

    #[test]
    fn test_corrupt_frame_isolates_damage() {
        // Three packets, each spanning multiple frames.
        let packets: Vec<Packet> = (0..6)
            .map(|i| Packet::new(vec![i as u8 + 1; 900]).unwrap())
            .collect();
        let frames = build_all(packets.clone());
        assert!(frames.len() >= 3);

        let mut parser = FrameParser::new();
        let mut out = Vec::new();
        for (i, f) in frames.iter().enumerate() {
            let rx = if i == 1 {
                RxFrame::Corrupt
            } else {
                RxFrame::Ok(f.bytes().to_vec())
            };
            out.extend(parser.push_frame(rx));
        }

        // Exactly the packets with bytes in frame 1 are gone; everything
        // else survives in order.
        assert!(out.len() < packets.len());
        let mut expect = packets.clone();
        expect.retain(|p| out.contains(p));
        assert_eq!(out, expect);
        // Packets living entirely in frame 0 must have survived.
        assert!(out.contains(&packets[0]));
        // The last packet must have survived.
        assert!(out.contains(packets.last().unwrap()));
    }

    #[test]
    fn test_corrupt_frame_then_pure_continuation_frames() {
        // One huge packet spans several frames; corrupting its first
        // frame must swallow the rest of it silently.
        let big = Packet::new(vec![0x44; 6000]).unwrap();
        let after = Packet::new(vec![0x55; 100]).unwrap();
        let frames = build_all(vec![big, after.clone()]);

        let mut parser = FrameParser::new();
        let mut out = Vec::new();
        for (i, f) in frames.iter().enumerate() {
            let rx = if i == 0 {
                RxFrame::Corrupt
            } else {
                RxFrame::Ok(f.bytes().to_vec())
            };
            out.extend(parser.push_frame(rx));
        }
        assert_eq!(out, vec![after]);
    }

    #[test]
    fn test_builder_blocks_until_data() {
        let queue = Arc::new(PacketQueue::new());
        let q = queue.clone();
        let handle = thread::spawn(move || {
            let mut builder = FrameBuilder::new();
            builder.next_frame(&q)
        });
        thread::sleep(std::time::Duration::from_millis(50));
        assert!(!handle.is_finished());
        queue.push(Packet::new(vec![9; 9]).unwrap());
        let frame = handle.join().unwrap().unwrap();
        assert_eq!(frame.counter(), 2);
        queue.close();
    }

    #[test]
    fn test_closed_empty_queue_yields_none() {
        let queue = PacketQueue::new();
        queue.close();
        assert!(FrameBuilder::new().next_frame(&queue).is_none());
    }
}
