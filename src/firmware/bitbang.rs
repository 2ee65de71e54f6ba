//! Slave-serial bitbang cable handshake and bitstream framing
//! (`spec.md` §4.2).
//!
//! The cable's FTDI chip is put into raw bitbang mode, where every byte
//! written directly drives the pin levels named below. This is how the
//! FPGA's Xilinx slave-serial configuration port (`CCLK`, `DIN`, `PROG_B`,
//! `INIT_B`) is driven without any dedicated configuration hardware.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::link::{BitMode, ByteLink};

/// Pin assignments within a single bitbang byte.
pub mod pin {
    pub const CCLK: u8 = 1 << 0;
    pub const PROG: u8 = 1 << 1;
    pub const D2: u8 = 1 << 2;
    pub const D3: u8 = 1 << 3;
    #[allow(dead_code)]
    pub const D4: u8 = 1 << 4;
    pub const INIT: u8 = 1 << 5;
    pub const DIN: u8 = 1 << 6;
    pub const D7: u8 = 1 << 7;
}

/// All pins except `INIT_B` are host-driven outputs during configuration.
pub const PIN_MASK: u8 = !pin::INIT;

/// Bitbang clock rate used for netlist download.
pub const BITBANG_BAUD: u32 = 750_000;

const INIT_POLL_ATTEMPTS: usize = 10;
const INIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The 8-byte D2/D3/D7 toggle pattern that halts the FPGA's current
/// execution before reprogramming, sent four times in a row.
fn suicide_sequence() -> [u8; 8] {
    [
        pin::D7 | pin::D2,
        pin::D7 | pin::D2,
        pin::D7 | pin::D3,
        pin::D7 | pin::D2,
        pin::D7 | pin::D3,
        pin::D7 | pin::D2,
        pin::D7 | pin::D3,
        pin::D7 | pin::D2,
    ]
}

/// Pulses `PROG_B` and waits for the FPGA to assert `INIT_B`, after first
/// running the suicide sequence. Puts the link in the state slave-serial
/// configuration data can be streamed into.
pub fn enter_configuration_mode(link: &mut impl ByteLink) -> Result<()> {
    let suicide = suicide_sequence();
    for _ in 0..4 {
        link.write(&suicide)?;
    }

    let prog_pulse: [u8; 10] = [
        pin::CCLK,
        pin::CCLK | pin::PROG,
        pin::CCLK | pin::PROG,
        pin::CCLK,
        pin::CCLK,
        pin::CCLK,
        pin::CCLK,
        pin::CCLK,
        pin::CCLK,
        pin::CCLK,
    ];
    link.write(&prog_pulse)?;
    link.purge()?;

    let mut byte = [0u8; 1];
    for _ in 0..INIT_POLL_ATTEMPTS {
        if link.read(&mut byte)? > 0 && byte[0] & pin::INIT != 0 {
            return Ok(());
        }
        std::thread::sleep(INIT_POLL_INTERVAL);
    }

    Err(Error::Timeout { what: "INIT_B" })
}

/// Expands a descrambled firmware image into bitbang samples: two per
/// configuration bit, MSB-first within each byte. The first sample of a
/// pair asserts `DIN` at the bit's level together with `CCLK`; the second
/// holds `DIN` while releasing `CCLK`, producing the rising edge that
/// latches the bit (`CCLK` is inverted by the level-shifting hardware).
pub fn expand_to_bitbang(image: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.len() * 16);
    for &byte in image {
        let mut mask = 0x80u8;
        while mask != 0 {
            let level = if byte & mask != 0 { pin::DIN } else { 0 };
            out.push(level | pin::CCLK);
            out.push(level);
            mask >>= 1;
        }
    }
    out
}

/// Convenience wrapper switching the link into and out of bitbang mode.
pub fn with_bitbang_mode<L: ByteLink, T>(
    link: &mut L,
    f: impl FnOnce(&mut L) -> Result<T>,
) -> Result<T> {
    link.set_bitmode(PIN_MASK, BitMode::Bitbang)?;
    link.set_baudrate(BITBANG_BAUD)?;
    let result = f(link);
    link.set_bitmode(0, BitMode::Reset)?;
    result
}
