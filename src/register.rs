//! Register transport: the nibble-framed command protocol layered on top
//! of the byte link (C2).
//!
//! See `spec.md` §4.1. Every command byte carries a 4-bit opcode in the
//! high nibble and a 4-bit payload in the low nibble. The link is
//! half-duplex: a write must complete before the matching read is issued.

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::error::{Error, Result};
use crate::link::ByteLink;

/// Command opcodes, each occupying the high nibble of a command byte.
pub mod opcode {
    pub const ADDR_LOW: u8 = 0x0 << 4;
    pub const ADDR_HIGH: u8 = 0x1 << 4;
    pub const DATA_LOW: u8 = 0x2 << 4;
    pub const DATA_HIGH_WRITE: u8 = 0x3 << 4;
    pub const READ_ADDR: u8 = 0x4 << 4;
    pub const DRAM_WAIT_ACK: u8 = 0x5 << 4;
    pub const DRAM_BLOCK: u8 = 0x6 << 4;
    pub const DRAM_BLOCK_DATA: u8 = 0x7 << 4;

    /// ORed onto [`READ_ADDR`] to make the strobe auto-increment the
    /// register address afterwards, instead of re-reading the same one.
    pub const ADDR_INC: u8 = 0x08;

    /// ORed onto [`DRAM_BLOCK`] / [`DRAM_BLOCK_DATA`] to pick the
    /// ping-pong buffer (0 or 1) the command applies to.
    pub const fn dram_sel(buffer: bool) -> u8 {
        (buffer as u8) << 3
    }
}

/// On-device register addresses this driver touches.
pub mod addr {
    pub const READ_ID: u8 = 0x00;
    pub const WRITE_TEST: u8 = 0x00;
    pub const WRITE_MODE: u8 = 0x01;
    pub const READ_MODE: u8 = 0x01;
    pub const WRITE_MEMROW: u8 = 0x02;
    pub const WRITE_TRIGGER_SELECT: u8 = 0x03;
    pub const WRITE_TRIGGER_SELECT2: u8 = 0x04;
    pub const READ_TRIGGER_POS_LOW: u8 = 0x05;
}

/// Write-mode register flags (`spec.md` §6).
pub mod mode_flag {
    pub const SDRAMWRITEEN: u8 = 1 << 0;
    pub const SDRAMREADEN: u8 = 1 << 1;
    pub const SDRAMINIT: u8 = 1 << 2;
    pub const FORCESTOP: u8 = 1 << 3;
}

/// Read-mode status register flags (`spec.md` §6).
pub mod mode_status {
    pub const TRIGGERED: u8 = 1 << 0;
    pub const POSTTRIGGERED: u8 = 1 << 1;
    pub const ROUND: u8 = 1 << 2;
}

/// Selector nibble ORed with `0x30` and written to `WRITE_TRIGGER_SELECT2`
/// to address one of the 16 trigger LUT rows (`spec.md` §4.5 "Upload").
pub const TRIGGER_SELECT2_BASE: u8 = 0x30;

/// Worst-case register write is `2` address-setup bytes plus `2` data
/// bytes per payload byte. Writes that would exceed this are rejected
/// with [`Error::InternalBug`] rather than silently truncated
/// (`spec.md` §4.1 "Buffering guarantee").
pub const MAX_REGISTER_WRITE_BYTES: usize = 80;

/// Encodes and decodes the nibble-framed register protocol on top of a
/// [`ByteLink`].
pub struct RegisterProtocol<L> {
    link: L,
}

impl<L: ByteLink> RegisterProtocol<L> {
    pub fn new(link: L) -> Self {
        RegisterProtocol { link }
    }

    /// Gives back the underlying link, e.g. so the FPGA loader can drive
    /// bitbang mode directly.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Writes raw bytes directly to the link, bypassing register framing.
    /// Used by the DRAM reader (C7), whose block/ack/select opcodes are
    /// already complete command bytes.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.link.write(bytes)?;
        Ok(())
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.link.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "byte link returned no data",
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Writes `data` (up to `0xff` bytes) to register `reg`, emitting the
    /// strict `ADDR_LOW, ADDR_HIGH, (DATA_LOW, DATA_HIGH_WRITE) * N`
    /// sequence (`spec.md` §4.1 "Framing").
    pub fn write_register(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        let needed = 2 + 2 * data.len();
        if needed > MAX_REGISTER_WRITE_BYTES {
            return Err(Error::InternalBug(
                "register write exceeds scratch buffer bound",
            ));
        }

        let mut cmd = Vec::with_capacity(needed);
        cmd.push(opcode::ADDR_LOW | (reg & 0xf));
        cmd.push(opcode::ADDR_HIGH | (reg >> 4));
        for &byte in data {
            cmd.push(opcode::DATA_LOW | (byte & 0xf));
            cmd.push(opcode::DATA_HIGH_WRITE | (byte >> 4));
        }

        trace!("write_register(reg=0x{:02x}, {} bytes)", reg, data.len());
        self.link.write(&cmd)?;
        Ok(())
    }

    /// Writes a single byte to `reg`.
    pub fn set_register(&mut self, reg: u8, value: u8) -> Result<()> {
        self.write_register(reg, &[value])
    }

    /// Reads `len` bytes from `reg`, optionally auto-incrementing the
    /// register address between strobes (`spec.md` §4.1 "Framing"). The
    /// write must complete before the `len` response bytes are drained,
    /// since the link is half-duplex.
    pub fn read_register(&mut self, reg: u8, len: usize, auto_increment: bool) -> Result<Vec<u8>> {
        let strobe = opcode::READ_ADDR | if auto_increment { opcode::ADDR_INC } else { 0 };

        let mut cmd = Vec::with_capacity(2 + len);
        cmd.push(opcode::ADDR_LOW | (reg & 0xf));
        cmd.push(opcode::ADDR_HIGH | (reg >> 4));
        cmd.extend(std::iter::repeat_n(strobe, len));

        self.link.write(&cmd)?;

        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads the trigger and stop position counters (`spec.md` §4.1
    /// "Position read"). Returns `(stop_pos, trigger_pos)`.
    ///
    /// Issues a single `ADDR_LOW` setup at `READ_TRIGGER_POS_LOW` followed
    /// by six auto-incrementing read strobes, yielding two packed 24-bit
    /// little-endian counters (trigger first, then stop). Both counters
    /// are decremented by one after the read (they point one past the
    /// last event) and corrected by `-64` if that lands them in the
    /// hardware-reserved last slot of a row. This two-step adjustment is
    /// load-bearing and must not be simplified (`spec.md` §4.1, §9).
    pub fn read_positions(&mut self) -> Result<(u32, u32)> {
        let mut cmd = Vec::with_capacity(7);
        cmd.push(opcode::ADDR_LOW | (addr::READ_TRIGGER_POS_LOW & 0xf));
        cmd.extend(std::iter::repeat_n(opcode::READ_ADDR | opcode::ADDR_INC, 6));

        self.link.write(&cmd)?;

        let mut result = [0u8; 6];
        self.read_exact(&mut result)?;

        let trigger_pos = LittleEndian::read_uint(&result[0..3], 3) as u32;
        let stop_pos = LittleEndian::read_uint(&result[3..6], 3) as u32;

        Ok((adjust_position(stop_pos), adjust_position(trigger_pos)))
    }
}

/// `--pos; if (pos & 0x1ff) == 0x1ff: pos -= 64`.
///
/// Positions point one past the event they describe. Decrementing can
/// land the value in the last `u16` slot of a 512-slot row, which is
/// hardware-reserved; the `-64` corrects for that. Preserve the
/// arithmetic verbatim — see `spec.md` §9 "Position adjustment".
fn adjust_position(pos: u32) -> u32 {
    let pos = pos.wrapping_sub(1);
    if pos & 0x1ff == 0x1ff {
        pos - 64
    } else {
        pos
    }
}
