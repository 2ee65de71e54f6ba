//! Building and uploading the 16-row trigger look-up table the FPGA
//! actually evaluates (`spec.md` §4.5 "Low-level -> LUT (basic rates
//! only)", "Upload"). Only reachable at basic samplerates — the LUT is
//! never consulted at `>= 100 MHz`, where the hardware instead matches a
//! single edge directly.

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::error::Result;
use crate::link::ByteLink;
use crate::register::{addr, RegisterProtocol, TRIGGER_SELECT2_BASE};
use crate::trigger::config::TriggerConfig;

register_bitfields! {
    u16,
    /// The final word appended after all 16 LUT rows.
    pub Params [
        SELRES OFFSET(0) NUMBITS(2) []
    ]
}

/// The boolean condition a single [`add_trigger_function`] call folds
/// into a mask, expressed over a channel's `(last, cur)` sample pair.
#[derive(Clone, Copy, Debug)]
pub enum Op {
    Level,
    Not,
    Rise,
    Fall,
    RiseFall,
    NotRise,
    NotFall,
    NotRiseFall,
}

/// How a term combines with whatever is already in the mask being built.
#[derive(Clone, Copy, Debug)]
pub enum Func {
    And,
    Nand,
    Or,
    Nor,
    Xor,
    Nxor,
}

/// A fully built set of trigger LUT rows plus the parameter word that
/// follows them (`spec.md` §4.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerLut {
    pub m2d: [u16; 4],
    pub m0d: [u16; 4],
    pub m1d: [u16; 4],
    pub m3: u16,
    /// Reserved sample-type term; never set by [`build_basic_trigger`].
    pub m3s: u16,
    pub m4: u16,
    pub params: u16,
}

/// `x[last][cur]` truth table for `op`.
fn truth_table(op: Op) -> [[bool; 2]; 2] {
    let mut x = [[false; 2]; 2];
    match op {
        Op::Level => {
            x[0][1] = true;
            x[1][1] = true;
        }
        Op::Not => {
            x[0][0] = true;
            x[1][0] = true;
        }
        Op::Rise => x[0][1] = true,
        Op::Fall => x[1][0] = true,
        Op::RiseFall => {
            x[0][1] = true;
            x[1][0] = true;
        }
        Op::NotRise => {
            x[1][1] = true;
            x[0][0] = true;
            x[1][0] = true;
        }
        Op::NotFall => {
            x[1][1] = true;
            x[0][0] = true;
            x[0][1] = true;
        }
        Op::NotRiseFall => {
            x[1][1] = true;
            x[0][0] = true;
        }
    }
    x
}

/// Folds `op` combined via `func` into `mask`, testing the channel's
/// `(last, cur)` sample pair at bit positions `2*index` (`cur`) and
/// `2*index+1` (`last`) of each of the 16 LUT indices.
///
/// `neg` transposes the truth table before folding it in, swapping its
/// `last`/`cur` roles.
pub fn add_trigger_function(op: Op, func: Func, index: u8, neg: bool, mask: &mut u16) {
    let x = truth_table(op);
    let x = if neg {
        [[x[0][0], x[1][0]], [x[0][1], x[1][1]]]
    } else {
        x
    };

    for i in 0..16u16 {
        let a = (i >> (2 * index)) & 1;
        let b = (i >> (2 * index + 1)) & 1;
        let aset = (*mask >> i) & 1 != 0;
        let bset = x[b as usize][a as usize];

        let rset = match func {
            Func::And => aset & bset,
            Func::Nand => !(aset & bset),
            Func::Or => aset | bset,
            Func::Nor => !(aset | bset),
            Func::Xor => aset ^ bset,
            Func::Nxor => !(aset ^ bset),
        };

        *mask &= !(1 << i);
        if rset {
            *mask |= 1 << i;
        }
    }
}

/// Builds one quad-channel LUT row: bit `j` of the result is set unless
/// some masked channel within the quad disagrees with `value` at index
/// `j` (`spec.md` §4.5 "value/mask -> m2d").
pub fn build_lut_entry(value: u16, mask: u16) -> [u16; 4] {
    let mut entry = [0xffffu16; 4];
    for quad in 0..4u16 {
        for j in 0..16u16 {
            for bit in 0..4u16 {
                let channel_bit = 1u16 << (quad * 4 + bit);
                if mask & channel_bit == 0 {
                    continue;
                }
                let value_bit = value & channel_bit != 0;
                let j_bit = j & (1 << bit) != 0;
                if value_bit != j_bit {
                    entry[quad as usize] &= !(1 << j);
                }
            }
        }
    }
    entry
}

/// Builds the full LUT for `cfg`: the value/mask term goes straight into
/// `m2d`, and up to two edge channels each get their own single-channel
/// mask row (`m0d`/`m1d`) OR'd together into `m3` (`spec.md` §4.5).
pub fn build_basic_trigger(cfg: &TriggerConfig) -> TriggerLut {
    let m2d = build_lut_entry(cfg.simple_value, cfg.simple_mask);

    let mut masks = [0u16; 2];
    let mut n = 0;
    for ch in 0..16u16 {
        if n >= masks.len() {
            break;
        }
        let bit = 1u16 << ch;
        if cfg.rising_mask & bit != 0 || cfg.falling_mask & bit != 0 {
            masks[n] = bit;
            n += 1;
        }
    }

    let m0d = build_lut_entry(masks[0], masks[0]);
    let m1d = build_lut_entry(masks[1], masks[1]);

    let mut m3 = 0u16;
    if masks[0] != 0 || masks[1] != 0 {
        if masks[0] & cfg.rising_mask != 0 {
            add_trigger_function(Op::Rise, Func::Or, 0, false, &mut m3);
        }
        if masks[0] & cfg.falling_mask != 0 {
            add_trigger_function(Op::Fall, Func::Or, 0, false, &mut m3);
        }
        if masks[1] & cfg.rising_mask != 0 {
            add_trigger_function(Op::Rise, Func::Or, 1, false, &mut m3);
        }
        if masks[1] & cfg.falling_mask != 0 {
            add_trigger_function(Op::Fall, Func::Or, 1, false, &mut m3);
        }
    } else {
        // No edge term configured: don't let an all-zero m3 veto the
        // value/mask term it is ANDed against downstream.
        m3 = 0xffff;
    }

    let mut params: LocalRegisterCopy<u16, Params::Register> = LocalRegisterCopy::new(0);
    params.write(Params::SELRES.val(3));

    TriggerLut {
        m2d,
        m0d,
        m1d,
        m3,
        m3s: 0,
        m4: 0xa000,
        params: params.get(),
    }
}

/// Streams `lut` to the device, one `WRITE_TRIGGER_SELECT` /
/// `WRITE_TRIGGER_SELECT2` pair per LUT index, followed by the parameter
/// word (`spec.md` §4.5 "Upload").
pub fn upload<L: ByteLink>(protocol: &mut RegisterProtocol<L>, lut: &TriggerLut) -> Result<()> {
    for i in 0..16u16 {
        let bit = 1u16 << i;
        let mut tmp0 = 0u8;
        let mut tmp1 = 0u8;

        tmp0 |= (lut.m2d[0] & bit != 0) as u8;
        tmp0 |= ((lut.m2d[1] & bit != 0) as u8) << 1;
        tmp0 |= ((lut.m2d[2] & bit != 0) as u8) << 2;
        tmp0 |= ((lut.m2d[3] & bit != 0) as u8) << 3;
        tmp0 |= ((lut.m3 & bit != 0) as u8) << 4;
        tmp0 |= ((lut.m3s & bit != 0) as u8) << 5;
        tmp0 |= ((lut.m4 & bit != 0) as u8) << 6;

        tmp1 |= (lut.m0d[0] & bit != 0) as u8;
        tmp1 |= ((lut.m0d[1] & bit != 0) as u8) << 1;
        tmp1 |= ((lut.m0d[2] & bit != 0) as u8) << 2;
        tmp1 |= ((lut.m0d[3] & bit != 0) as u8) << 3;
        tmp1 |= ((lut.m1d[0] & bit != 0) as u8) << 4;
        tmp1 |= ((lut.m1d[1] & bit != 0) as u8) << 5;
        tmp1 |= ((lut.m1d[2] & bit != 0) as u8) << 6;
        tmp1 |= ((lut.m1d[3] & bit != 0) as u8) << 7;

        protocol.write_register(addr::WRITE_TRIGGER_SELECT, &[tmp0, tmp1])?;
        protocol.set_register(addr::WRITE_TRIGGER_SELECT2, TRIGGER_SELECT2_BASE | i as u8)?;
    }

    protocol.write_register(addr::WRITE_TRIGGER_SELECT, &lut.params.to_le_bytes())?;
    Ok(())
}
