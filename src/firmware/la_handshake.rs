//! Logic-analyzer mode handshake run after every configuration download
//! (`spec.md` §4.3).
//!
//! Confirms the freshly configured FPGA is alive and speaking the
//! register protocol before the driver trusts it with capture commands.
//! There are no retries: any mismatch aborts arming.

use crate::error::{Error, Result};
use crate::link::ByteLink;
use crate::register::{addr, mode_flag, RegisterProtocol};

const EXPECTED_ID: u8 = 0xa6;

/// Reads the ID register, round-trips two scratch-register test patterns,
/// and finally kicks off SDRAM initialization via the mode register.
pub fn run<L: ByteLink>(protocol: &mut RegisterProtocol<L>) -> Result<()> {
    let id = protocol.read_register(addr::READ_ID, 1, false)?[0];
    if id != EXPECTED_ID {
        return Err(Error::Protocol {
            stage: "ID register",
            expected: EXPECTED_ID,
            actual: id,
        });
    }

    check_scratch_echo(protocol, 0x55)?;
    check_scratch_echo(protocol, 0xaa)?;

    protocol.set_register(addr::WRITE_MODE, mode_flag::SDRAMINIT)?;
    Ok(())
}

fn check_scratch_echo<L: ByteLink>(protocol: &mut RegisterProtocol<L>, value: u8) -> Result<()> {
    protocol.set_register(addr::WRITE_TEST, value)?;
    let echo = protocol.read_register(addr::WRITE_TEST, 1, false)?[0];
    if echo != value {
        return Err(Error::Protocol {
            stage: "scratch register echo",
            expected: value,
            actual: echo,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockLink;

    #[test]
    fn succeeds_on_expected_replies() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        protocol
            .link_mut()
            .queue_read(&[EXPECTED_ID, 0x55, 0xaa]);
        run(&mut protocol).unwrap();
    }

    #[test]
    fn fails_on_bad_id() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        protocol.link_mut().queue_read(&[0x00]);
        let err = run(&mut protocol).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                stage: "ID register",
                expected: EXPECTED_ID,
                actual: 0x00
            }
        ));
    }

    #[test]
    fn fails_on_bad_scratch_echo() {
        let mut protocol = RegisterProtocol::new(MockLink::new());
        protocol.link_mut().queue_read(&[EXPECTED_ID, 0x00]);
        let err = run(&mut protocol).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol {
                stage: "scratch register echo",
                expected: 0x55,
                ..
            }
        ));
    }
}
