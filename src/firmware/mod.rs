//! FPGA bring-up (C3): descrambling and streaming a netlist into the
//! device, then confirming logic-analyzer mode came up (`spec.md` §4.2,
//! §4.3).

mod bitbang;
mod descramble;
mod la_handshake;

use log::info;

use crate::error::{Error, Result};
use crate::link::ByteLink;
#[cfg(test)]
use crate::link::BitMode;
use crate::register::RegisterProtocol;
use crate::samplerate::FirmwareSlot;

/// Firmware images are capped at 256 KiB on-device (`spec.md` §6).
pub const FIRMWARE_SIZE_LIMIT: usize = 256 * 1024;

/// Uploads `firmware_image` for `slot` unless it is already resident.
///
/// Idempotent: if `*current_firmware == Some(slot)` this returns
/// immediately without touching the byte link at all (`spec.md` §4.2
/// "Idempotence", §8 scenario 6). On any failure, `*current_firmware` is
/// left unchanged so the caller's next attempt retries from scratch
/// (`spec.md` §7 "Propagation").
pub fn upload<L: ByteLink>(
    protocol: &mut RegisterProtocol<L>,
    current_firmware: &mut Option<FirmwareSlot>,
    slot: FirmwareSlot,
    firmware_image: &[u8],
) -> Result<()> {
    if *current_firmware == Some(slot) {
        info!(
            "firmware '{}' already loaded, skipping upload",
            slot.firmware_file()
        );
        return Ok(());
    }

    if firmware_image.len() > FIRMWARE_SIZE_LIMIT {
        return Err(Error::FirmwareTooLarge {
            len: firmware_image.len(),
            limit: FIRMWARE_SIZE_LIMIT,
        });
    }

    info!("uploading firmware '{}'", slot.firmware_file());

    let mut image = firmware_image.to_vec();
    descramble::descramble_in_place(&mut image);
    let bitbang_stream = bitbang::expand_to_bitbang(&image);

    bitbang::with_bitbang_mode(protocol.link_mut(), |link| {
        bitbang::enter_configuration_mode(link)?;
        link.write(&bitbang_stream)?;
        Ok(())
    })?;

    protocol.link_mut().purge()?;
    drain_pending(protocol.link_mut())?;

    la_handshake::run(protocol)?;

    *current_firmware = Some(slot);
    info!("firmware uploaded: '{}'", slot.firmware_file());
    Ok(())
}

/// Drains any bytes left over from bitbang mode before the register
/// protocol resumes, so a stray byte doesn't get misread as a register
/// response.
fn drain_pending<L: ByteLink>(link: &mut L) -> Result<()> {
    let mut scratch = [0u8; 1];
    while link.read(&mut scratch)? > 0 {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockLink;

    #[test]
    fn cache_hit_touches_neither_bitmode_nor_baudrate() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        let mut current = Some(FirmwareSlot::Basic);
        upload(&mut protocol, &mut current, FirmwareSlot::Basic, &[]).unwrap();

        assert!(protocol.link_mut().bitmode_calls().is_empty());
        assert!(protocol.link_mut().baudrate_calls().is_empty());
    }

    #[test]
    fn rejects_oversized_firmware() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        let mut current = None;
        let big = vec![0u8; FIRMWARE_SIZE_LIMIT + 1];
        let err = upload(&mut protocol, &mut current, FirmwareSlot::Basic, &big).unwrap_err();
        assert!(matches!(err, Error::FirmwareTooLarge { .. }));
        assert_eq!(current, None);
    }

    #[test]
    fn successful_upload_records_current_firmware() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        // INIT_B poll reply, then ID/scratch echoes for the LA handshake.
        // The boundary models the handshake bytes not existing yet when
        // `drain_pending` runs, so it doesn't eat them.
        protocol.link_mut().queue_read(&[bitbang::pin::INIT]);
        protocol.link_mut().queue_read_boundary();
        protocol
            .link_mut()
            .queue_read(&[0xa6, 0x55, 0xaa]);

        let mut current = None;
        upload(&mut protocol, &mut current, FirmwareSlot::Basic, &[0xAA, 0xBB]).unwrap();

        assert_eq!(current, Some(FirmwareSlot::Basic));
        assert_eq!(
            protocol.link_mut().bitmode_calls(),
            &[
                (bitbang::PIN_MASK, BitMode::Bitbang),
                (0, BitMode::Reset),
            ]
        );
        assert_eq!(protocol.link_mut().baudrate_calls(), &[bitbang::BITBANG_BAUD]);
    }

    #[test]
    fn failed_upload_leaves_current_firmware_untouched() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        // No INIT_B ever observed -> bitbang handshake times out.
        let mut current = None;
        let err = upload(&mut protocol, &mut current, FirmwareSlot::Basic, &[0x01]).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(current, None);
    }
}
