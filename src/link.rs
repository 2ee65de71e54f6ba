//! The untyped byte pipe to the cable (C1).
//!
//! This is the one external collaborator the rest of the crate is built
//! against: a raw, ordered, half-duplex byte channel to the FTDI-based
//! USB cable. Discovering, opening, and closing the actual USB device is
//! out of scope (`spec.md` §1) — callers provide an implementation of
//! [`ByteLink`] that already owns an open connection.
//!
//! # Usage
//!
//! ```no_run
//! use asix_sigma_core::link::{BitMode, ByteLink};
//!
//! struct MyFtdiHandle;
//!
//! impl ByteLink for MyFtdiHandle {
//!     fn write(&mut self, _data: &[u8]) -> std::io::Result<()> { Ok(()) }
//!     fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> { Ok(0) }
//!     fn purge(&mut self) -> std::io::Result<()> { Ok(()) }
//!     fn set_bitmode(&mut self, _pin_mask: u8, _mode: BitMode) -> std::io::Result<()> { Ok(()) }
//!     fn set_baudrate(&mut self, _bps: u32) -> std::io::Result<()> { Ok(()) }
//! }
//! ```

/// Cable operating mode, as driven through `ftdi_set_bitmode`-style calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitMode {
    /// Normal UART/FIFO framing; pins are not individually addressable.
    Reset,
    /// Raw bitbang mode: each byte written/read directly drives/samples
    /// the pins selected by the pin mask.
    Bitbang,
}

/// An ordered, half-duplex byte pipe to the cable.
///
/// Implementations own the underlying USB/FTDI handle. The register
/// protocol (C2) and the FPGA loader (C3) are the only callers; both
/// assume that a `write` is visible to the device before the matching
/// `read` is issued, and that no other caller interleaves commands on the
/// same link while a `(write, read)` pair is in flight (`spec.md` §5).
pub trait ByteLink {
    /// Writes `data` to the cable in order. Must not return until the
    /// bytes have been handed off to the transport (though not
    /// necessarily until the device has consumed them).
    fn write(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Reads up to `buf.len()` bytes into `buf`, returning the number of
    /// bytes actually read. May return fewer bytes than requested; the
    /// register protocol layer is responsible for looping until it has
    /// everything it expects.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Discards any buffered but unread bytes on both host and device
    /// sides, to the extent the transport supports it.
    fn purge(&mut self) -> std::io::Result<()>;

    /// Switches pin-level bitbang mode on or off and selects which pins
    /// are host-driven outputs via `pin_mask` (a set bit is an output).
    fn set_bitmode(&mut self, pin_mask: u8, mode: BitMode) -> std::io::Result<()>;

    /// Sets the transport's baud rate (bits/s). In bitbang mode this
    /// controls how fast pin samples are clocked out.
    fn set_baudrate(&mut self, bps: u32) -> std::io::Result<()>;
}
