//! DRAM reader (C7): drains the device's circular sample buffer in
//! 1024-byte rows, driving the two ping-pong on-FPGA transfer buffers
//! (`spec.md` §4.7).

use log::trace;

use crate::error::{Error, Result};
use crate::link::ByteLink;
use crate::register::{addr, opcode, RegisterProtocol};

/// Number of 1024-byte rows the device's DRAM circular buffer holds.
///
/// `ROW_COUNT * 512` equals the 24-bit range of the position counters
/// read back by [`RegisterProtocol::read_positions`], which is the
/// evidence this value is correct (`spec.md` §3 "DRAM layout").
pub const ROW_COUNT: u32 = 32 * 1024;

/// Bytes per row: 64 clusters of 16 bytes each.
pub const ROW_LENGTH_BYTES: usize = 1024;

/// The device can only prefetch this many rows per `read_dram` call
/// before the ping-pong buffers need restarting (`spec.md` §4.7).
pub const MAX_ROWS_PER_READ: u32 = 32;

static_assertions::const_assert_eq!(ROW_LENGTH_BYTES, 64 * crate::decode::CLUSTER_BYTES);

/// Reads `row_count` rows (`<= `[`MAX_ROWS_PER_READ`]) starting at
/// `start_row`, returning exactly `row_count * ROW_LENGTH_BYTES` bytes.
///
/// Sets `WRITE_MEMROW` to `start_row` (big-endian), then issues one
/// opening `DRAM_BLOCK`/`DRAM_WAIT_ACK` pair followed by, per row `k`
/// (`sel = k & 1`): a prefetch of the *other* buffer unless this is the
/// last row, always a transfer of buffer `sel` to the host, and a wait
/// for that prefetch unless this is the last row. This overlaps the
/// FPGA's DRAM-to-internal-RAM fetch of one buffer with the USB
/// transfer of the other.
pub fn read_dram<L: ByteLink>(
    protocol: &mut RegisterProtocol<L>,
    start_row: u16,
    row_count: u32,
) -> Result<Vec<u8>> {
    if row_count > MAX_ROWS_PER_READ {
        return Err(Error::InternalBug(
            "read_dram: row_count exceeds the per-call limit",
        ));
    }
    if row_count == 0 {
        return Ok(Vec::new());
    }

    protocol.write_register(
        addr::WRITE_MEMROW,
        &[(start_row >> 8) as u8, (start_row & 0xff) as u8],
    )?;

    let mut cmd = Vec::with_capacity(2 + 3 * row_count as usize);
    cmd.push(opcode::DRAM_BLOCK);
    cmd.push(opcode::DRAM_WAIT_ACK);
    for chunk in 0..row_count {
        let sel = chunk % 2 != 0;
        let is_last = chunk == row_count - 1;
        if !is_last {
            cmd.push(opcode::DRAM_BLOCK | opcode::dram_sel(!sel));
        }
        cmd.push(opcode::DRAM_BLOCK_DATA | opcode::dram_sel(sel));
        if !is_last {
            cmd.push(opcode::DRAM_WAIT_ACK);
        }
    }
    protocol.write_raw(&cmd)?;

    trace!("read_dram(start_row={start_row}, row_count={row_count})");
    let mut data = vec![0u8; row_count as usize * ROW_LENGTH_BYTES];
    protocol.read_exact(&mut data)?;
    Ok(data)
}
