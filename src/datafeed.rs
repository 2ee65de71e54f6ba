//! Downstream datafeed: the external collaborator that consumes decoded
//! samples (`spec.md` §6).
//!
//! The enclosing measurement-session framework owns the actual sample
//! bus; this crate only needs somewhere to push two kinds of packets and
//! a way to mark the end of a capture.

/// A run of little-endian 16-bit channel snapshots.
///
/// `unit_size` is always `2` for this device (16 channels packed into one
/// `u16`); it's carried explicitly so a [`Datafeed`] implementation can
/// assert it rather than assume it.
pub struct LogicPacket<'a> {
    pub unit_size: usize,
    pub data: &'a [u8],
}

/// The two packet kinds the Sigma decoder ever emits, plus a callback for
/// the end of a capture.
pub trait Datafeed {
    /// Emits a run of logic samples.
    fn send_logic(&mut self, packet: LogicPacket<'_>);

    /// Emits a trigger marker (no payload). Only sent when triggers are
    /// enabled for the capture (`spec.md` §4.8).
    fn send_trigger(&mut self);

    /// Closes out the capture. Sent exactly once, after the last logic
    /// packet of a `download_capture` run.
    fn end(&mut self);
}
