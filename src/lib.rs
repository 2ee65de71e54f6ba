//! Host-side driver core for the ASIX SIGMA/SIGMA2 logic analyzer.
//!
//! This crate owns the device-facing half of the driver: framing register
//! commands (C2), bringing up the FPGA (C3), compiling and uploading
//! triggers (C5), driving the capture state machine (C6), draining DRAM
//! (C7) and decoding it into logic samples (C8). It does not open a USB
//! connection, does not know about any particular host measurement
//! framework's session API, and never spawns threads of its own
//! (`spec.md` §1 "Non-goals").
//!
//! Callers provide a [`link::ByteLink`] that already owns an open
//! connection to the cable, and a [`datafeed::Datafeed`] to receive
//! decoded samples; everything else is driven through [`Device`].

pub mod acquisition;
pub mod datafeed;
pub mod decode;
pub mod dram;
pub mod error;
pub mod firmware;
pub mod link;
pub mod register;
pub mod samplerate;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testutil;

pub use acquisition::State as AcquisitionState;
pub use error::{Error, Result};
pub use samplerate::Samplerate;
pub use trigger::{MatchKind, TriggerConfig, TriggerMatch, TriggerModel, TriggerStage};

use datafeed::Datafeed;
use link::ByteLink;
use register::RegisterProtocol;
use samplerate::FirmwareSlot;

/// Per-device state tying together the register protocol, the currently
/// resident firmware, the active samplerate and trigger configuration,
/// and the acquisition state machine (`spec.md` §3 "Device context").
///
/// A `Device` is not `Sync`: the protocol is a simple request/response
/// half-duplex conversation with no internal locking, so callers must
/// not drive it from more than one thread at a time (`spec.md` §5
/// "Concurrency").
pub struct Device<L> {
    protocol: RegisterProtocol<L>,
    current_firmware: Option<FirmwareSlot>,
    samplerate: Samplerate,
    trigger_cfg: TriggerConfig,
    use_triggers: bool,
    sample_cap: Option<u64>,
    controller: acquisition::Controller,
}

impl<L: ByteLink> Device<L> {
    /// Wraps `link` in a fresh driver context. No firmware is uploaded and
    /// no samplerate is selected on the device yet; both happen lazily the
    /// first time [`Device::start_capture`] needs them.
    ///
    /// The initial samplerate defaults to the lowest entry in the fixed
    /// table (`Samplerate::Khz200`); the spec does not mandate a default,
    /// so this crate picks the same "safe, always-available" choice the
    /// original implementation's own struct initializer uses.
    pub fn new(link: L) -> Self {
        Device {
            protocol: RegisterProtocol::new(link),
            current_firmware: None,
            samplerate: Samplerate::Khz200,
            trigger_cfg: TriggerConfig::none(),
            use_triggers: false,
            sample_cap: None,
            controller: acquisition::Controller::new(),
        }
    }

    /// Gives back the wrapped link, e.g. so the caller can close the
    /// underlying connection.
    pub fn into_link(self) -> L {
        self.protocol.into_link()
    }

    pub fn samplerate(&self) -> Samplerate {
        self.samplerate
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.controller.state()
    }

    /// Selects the samplerate used by the next capture. Takes effect the
    /// next time firmware is (re)loaded; does not touch the device itself
    /// (`spec.md` §4.4).
    pub fn set_samplerate(&mut self, rate: Samplerate) {
        self.samplerate = rate;
    }

    /// Compiles `model` against the current samplerate and, for basic
    /// rates, uploads the resulting LUT rows to the device
    /// (`spec.md` §4.5). `enabled` gates only the trigger marker sent to
    /// the datafeed during decode, not whether the condition is armed on
    /// the device (`SPEC_FULL.md` §3 "use_triggers gates the marker, not
    /// detection").
    pub fn set_trigger(&mut self, model: &TriggerModel, enabled: bool) -> Result<()> {
        self.trigger_cfg = trigger::compile_and_upload(&mut self.protocol, model, self.samplerate)?;
        self.use_triggers = enabled;
        Ok(())
    }

    /// Caps the number of samples a capture will forward to the datafeed,
    /// or `None` to forward everything decoded (`spec.md` §4.8
    /// "Downstream clamping").
    pub fn set_sample_cap(&mut self, cap: Option<u64>) {
        self.sample_cap = cap;
    }

    /// Ensures the firmware slot required by the current samplerate is
    /// resident, uploading `firmware_image` if not (`spec.md` §4.2).
    pub fn ensure_firmware(&mut self, firmware_image: &[u8]) -> Result<()> {
        let slot = self.samplerate.firmware_slot();
        firmware::upload(
            &mut self.protocol,
            &mut self.current_firmware,
            slot,
            firmware_image,
        )
    }

    /// Arms the capture: `Idle -> Capture` (`spec.md` §4.6 "Arming").
    /// `limit_samples` is an optional sample-count cap; when present it is
    /// both applied as the downstream clamp and used to derive the
    /// wall-clock timeout passed to the acquisition controller.
    pub fn start_capture(&mut self, limit_samples: Option<u64>) {
        self.sample_cap = limit_samples;
        let limit_msec =
            limit_samples.map(|n| acquisition::limit_msec(n, self.samplerate.as_hz()));
        self.controller.arm(limit_msec);
    }

    /// Requests an early stop: `Capture -> Stopping` (`spec.md` §5
    /// "Cancellation"). A no-op outside `Capture`.
    pub fn request_stop(&mut self) {
        self.controller.request_stop();
    }

    /// One tick of the host's event loop. When the wall-clock timeout
    /// elapses or a stop was requested, drains DRAM and decodes the
    /// capture into `datafeed`, returning `Ok(Some(status))`. Otherwise
    /// returns `Ok(None)` and the caller should poll again later
    /// (`spec.md` §4.6 "Poll tick").
    pub fn poll_tick<D: Datafeed>(
        &mut self,
        datafeed: &mut D,
    ) -> Result<Option<acquisition::StopStatus>> {
        if !self.controller.poll_tick() {
            return Ok(None);
        }

        let status = decode::download_capture(
            &mut self.protocol,
            self.samplerate,
            &self.trigger_cfg,
            self.use_triggers,
            self.sample_cap,
            datafeed,
        )?;
        self.controller.finish_download();
        Ok(Some(status))
    }
}
