//! Mock collaborators used by unit tests throughout this crate.
//!
//! These stand in for the two external interfaces named in `spec.md` §6:
//! the byte link (C1) and the downstream datafeed. Neither talks to real
//! hardware; they exist purely to script and observe protocol traffic.

use std::collections::VecDeque;

use crate::datafeed::{Datafeed, LogicPacket};
use crate::link::{BitMode, ByteLink};

/// An in-memory [`ByteLink`] backed by a write log and a pre-seeded read
/// queue.
#[derive(Default)]
pub struct MockLink {
    written: Vec<u8>,
    to_read: VecDeque<ReadItem>,
    bitmode_calls: Vec<(u8, BitMode)>,
    baudrate_calls: Vec<u32>,
    purge_calls: usize,
}

enum ReadItem {
    Byte(u8),
    /// Marks a point where no more bytes are available *yet* — the next
    /// `read()` returns `Ok(0)` here and consumes the marker, instead of
    /// handing back bytes queued after it. Models a link where a later
    /// reply hasn't been produced by the device yet, for tests that need
    /// to distinguish "nothing pending right now" from "nothing ever".
    Boundary,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes that subsequent `read()` calls will hand back, in
    /// order.
    pub fn queue_read(&mut self, bytes: &[u8]) {
        self.to_read.extend(bytes.iter().copied().map(ReadItem::Byte));
    }

    /// Inserts a point after which `read()` returns `Ok(0)` once before
    /// handing back any bytes queued after it.
    pub fn queue_read_boundary(&mut self) {
        self.to_read.push_back(ReadItem::Boundary);
    }

    /// All bytes written so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.written.clone()
    }

    pub fn bitmode_calls(&self) -> &[(u8, BitMode)] {
        &self.bitmode_calls
    }

    pub fn baudrate_calls(&self) -> &[u32] {
        &self.baudrate_calls
    }

    pub fn purge_calls(&self) -> usize {
        self.purge_calls
    }
}

impl ByteLink for MockLink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.to_read.front() {
                Some(ReadItem::Byte(byte)) => {
                    buf[n] = *byte;
                    n += 1;
                    self.to_read.pop_front();
                }
                Some(ReadItem::Boundary) => {
                    if n == 0 {
                        self.to_read.pop_front();
                    }
                    break;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn purge(&mut self) -> std::io::Result<()> {
        self.purge_calls += 1;
        Ok(())
    }

    fn set_bitmode(&mut self, pin_mask: u8, mode: BitMode) -> std::io::Result<()> {
        self.bitmode_calls.push((pin_mask, mode));
        Ok(())
    }

    fn set_baudrate(&mut self, bps: u32) -> std::io::Result<()> {
        self.baudrate_calls.push(bps);
        Ok(())
    }
}

/// A [`Datafeed`] that records every emitted packet for assertion.
#[derive(Default)]
pub struct MockDatafeed {
    pub logic_packets: Vec<Vec<u8>>,
    pub trigger_markers: usize,
    pub ended: bool,
}

impl MockDatafeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// All samples sent so far, flattened into one little-endian u16
    /// stream for easy assertions.
    pub fn samples(&self) -> Vec<u16> {
        self.logic_packets
            .iter()
            .flat_map(|packet| packet.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])))
            .collect()
    }
}

impl Datafeed for MockDatafeed {
    fn send_logic(&mut self, packet: LogicPacket<'_>) {
        self.logic_packets.push(packet.data.to_vec());
    }

    fn send_trigger(&mut self) {
        self.trigger_markers += 1;
    }

    fn end(&mut self) {
        self.ended = true;
    }
}
