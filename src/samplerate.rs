//! Samplerate table and firmware/channel policy (C4).
//!
//! See `spec.md` §3 "Samplerate table" and §4.4. The device supports a
//! fixed, ordered set of sampling rates; each rate maps to a firmware
//! slot (§6 "Firmware files") and a channel count, from which the number
//! of samples packed per on-wire "event" follows directly.

use crate::error::{Error, Result};

/// One of the ten samplerates the device firmware supports.
///
/// Ordered the same way `spec.md`'s table lists them; `as_hz` gives the
/// raw frequency used both on the wire and in `limit_msec` arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Samplerate {
    Khz200,
    Khz250,
    Khz500,
    Mhz1,
    Mhz5,
    Mhz10,
    Mhz25,
    Mhz50,
    Mhz100,
    Mhz200,
}

/// The fixed, ordered table of supported rates, in Hz.
pub const TABLE_HZ: [u64; 10] = [
    200_000,
    250_000,
    500_000,
    1_000_000,
    5_000_000,
    10_000_000,
    25_000_000,
    50_000_000,
    100_000_000,
    200_000_000,
];

impl Samplerate {
    const VARIANTS: [Samplerate; 10] = [
        Samplerate::Khz200,
        Samplerate::Khz250,
        Samplerate::Khz500,
        Samplerate::Mhz1,
        Samplerate::Mhz5,
        Samplerate::Mhz10,
        Samplerate::Mhz25,
        Samplerate::Mhz50,
        Samplerate::Mhz100,
        Samplerate::Mhz200,
    ];

    /// The rate in Hz, as used on the wire and in timeout arithmetic.
    pub fn as_hz(self) -> u64 {
        TABLE_HZ[self as usize]
    }

    /// Looks up the table entry matching `hz`, rejecting anything not in
    /// the fixed set (`spec.md` §4.4 "Rejects rates absent from the fixed
    /// table").
    pub fn from_hz(hz: u64) -> Result<Self> {
        Self::VARIANTS
            .iter()
            .copied()
            .find(|r| r.as_hz() == hz)
            .ok_or(Error::UnsupportedSamplerate(hz))
    }

    /// The firmware slot that must be loaded to sample at this rate.
    pub fn firmware_slot(self) -> FirmwareSlot {
        if self.as_hz() >= 100_000_000 {
            if self.as_hz() == 200_000_000 {
                FirmwareSlot::Mhz200
            } else {
                FirmwareSlot::Mhz100
            }
        } else {
            FirmwareSlot::Basic
        }
    }

    /// Number of channels available at this rate.
    pub fn num_channels(self) -> u8 {
        self.firmware_slot().num_channels()
    }

    /// `16 / num_channels`: how many samples the device packs per
    /// on-wire "event" at this rate. Always one of `{1, 2, 4}`.
    pub fn samples_per_event(self) -> u8 {
        16 / self.num_channels()
    }
}

/// Which of the device's firmware images must be resident for a given
/// samplerate. `spec.md` §6 lists five firmware files; `Basic` covers the
/// three named slots that are interchangeable from this driver's point
/// of view (`asix-sigma-50.fw`, `-50sync.fw`, `-phasor.fw` all load the
/// same register/channel layout this core cares about — picking between
/// them is scoped to the caller's configuration surface, out of scope
/// here per `spec.md` §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirmwareSlot {
    /// `<= 50 MHz`, 16 channels.
    Basic,
    /// `100 MHz`, 8 channels.
    Mhz100,
    /// `200 MHz`, 4 channels.
    Mhz200,
}

impl FirmwareSlot {
    /// File name backing this slot (`spec.md` §6).
    pub fn firmware_file(self) -> &'static str {
        match self {
            FirmwareSlot::Basic => "asix-sigma-50.fw",
            FirmwareSlot::Mhz100 => "asix-sigma-100.fw",
            FirmwareSlot::Mhz200 => "asix-sigma-200.fw",
        }
    }

    /// Channel count provided by this firmware image.
    pub fn num_channels(self) -> u8 {
        match self {
            FirmwareSlot::Basic => 16,
            FirmwareSlot::Mhz100 => 8,
            FirmwareSlot::Mhz200 => 4,
        }
    }
}
