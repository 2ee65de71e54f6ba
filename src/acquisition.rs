//! Acquisition controller (C6): the Idle -> Capture -> Stopping -> Download
//! -> Idle state machine, the wall-clock timeout derived from a sample
//! cap, and the force-stop handshake that hands the device over to
//! download (`spec.md` §4.6).

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::link::ByteLink;
use crate::register::{addr, mode_flag, mode_status, RegisterProtocol};

/// Where the acquisition controller currently is in its lifecycle
/// (`spec.md` §4.6 "States").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Capture,
    Stopping,
    Download,
}

/// Upper bound on how long the force-stop sequence busy-polls
/// `POSTTRIGGERED` before giving up.
///
/// The original driver polls this unconditionally with no deadline at
/// all, relying on the device being live (`spec.md` §9 "Exception-free
/// flow" names this as an open question in the source's own comments).
/// This crate adds the bound and surfaces [`Error::Timeout`] on expiry
/// rather than hanging the caller's event loop forever.
const POSTTRIGGERED_POLL_ATTEMPTS: usize = 500;
const POSTTRIGGERED_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Derives the wall-clock capture timeout from a sample-count cap
/// (`spec.md` §4.6 "Timeout derivation").
///
/// The additive term covers the worst case where RLE compression holds a
/// single cluster timestamp across its full 65536-tick range before the
/// pipeline flushes it to DRAM; without it, a capture of grounded pins
/// could stop before any data reaches the host (`spec.md` §8 boundary
/// case: `limit_msec(1 sample, 200 kHz) ~= 655ms`, not `~=0`).
pub fn limit_msec(limit_samples: u64, samplerate_hz: u64) -> u64 {
    let base = limit_samples * 1000 / samplerate_hz;
    let worst_cluster_ms = 65_536 * 1000 / samplerate_hz;
    base + 2 * worst_cluster_ms
}

/// Status gathered while forcing the device down into `Download`
/// (`spec.md` §4.6 "Force-stop sequence").
#[derive(Clone, Copy, Debug)]
pub struct StopStatus {
    pub stop_pos: u32,
    pub trigger_pos: u32,
    pub triggered: bool,
    pub round: bool,
}

impl StopStatus {
    /// The DRAM row the trigger landed in. Only meaningful when
    /// `triggered` is set.
    pub fn trigger_line(&self) -> u32 {
        self.trigger_pos >> 9
    }

    /// The in-row event offset the trigger landed at. Only meaningful
    /// when `triggered` is set.
    pub fn trigger_event(&self) -> u32 {
        self.trigger_pos & 0x1ff
    }
}

/// Forces the FPGA to stop writing DRAM, switches it to read mode, and
/// reads back the stop/trigger positions and status flags
/// (`spec.md` §4.6 "Force-stop sequence"). Entry point to `Download`.
pub fn force_stop<L: ByteLink>(protocol: &mut RegisterProtocol<L>) -> Result<StopStatus> {
    protocol.set_register(
        addr::WRITE_MODE,
        mode_flag::FORCESTOP | mode_flag::SDRAMWRITEEN,
    )?;

    let mut attempts = 0;
    loop {
        let status = protocol.read_register(addr::READ_MODE, 1, false)?[0];
        if status & mode_status::POSTTRIGGERED != 0 {
            break;
        }
        attempts += 1;
        if attempts >= POSTTRIGGERED_POLL_ATTEMPTS {
            return Err(Error::Timeout {
                what: "POSTTRIGGERED",
            });
        }
        std::thread::sleep(POSTTRIGGERED_POLL_INTERVAL);
    }

    protocol.set_register(addr::WRITE_MODE, mode_flag::SDRAMREADEN)?;

    let (stop_pos, trigger_pos) = protocol.read_positions()?;
    let status = protocol.read_register(addr::READ_MODE, 1, false)?[0];

    Ok(StopStatus {
        stop_pos,
        trigger_pos,
        triggered: status & mode_status::TRIGGERED != 0,
        round: status & mode_status::ROUND != 0,
    })
}

/// Drives the Idle -> Capture -> Stopping -> Download -> Idle lifecycle
/// and the periodic poll tick that decides when to leave `Capture`
/// (`spec.md` §4.6 "States", "Poll tick").
#[derive(Debug)]
pub struct Controller {
    state: State,
    start_time: Option<Instant>,
    limit_msec: Option<u64>,
}

impl Default for Controller {
    fn default() -> Self {
        Controller {
            state: State::Idle,
            start_time: None,
            limit_msec: None,
        }
    }
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Arms a capture: records the monotonic start time and transitions
    /// to `Capture` (`spec.md` §4.6 "Arming"). `limit_msec` is the
    /// wall-clock cap derived from an optional sample cap; `None` means
    /// the capture only ever stops on an explicit [`request_stop`].
    ///
    /// [`request_stop`]: Controller::request_stop
    pub fn arm(&mut self, limit_msec: Option<u64>) {
        self.start_time = Some(Instant::now());
        self.limit_msec = limit_msec;
        self.state = State::Capture;
        info!("acquisition armed (limit_msec={limit_msec:?})");
    }

    /// External stop request: `Capture -> Stopping`. A no-op from any
    /// other state (`spec.md` §5 "Cancellation").
    pub fn request_stop(&mut self) {
        if self.state == State::Capture {
            info!("acquisition stop requested");
            self.state = State::Stopping;
        }
    }

    /// One tick of the enclosing event loop. Returns `true` when the
    /// caller must now run the download path (`spec.md` §4.6
    /// "Poll tick").
    pub fn poll_tick(&mut self) -> bool {
        match self.state {
            State::Capture => {
                let Some(limit) = self.limit_msec else {
                    return false;
                };
                let elapsed_ms = self
                    .start_time
                    .expect("start_time is set whenever state is Capture")
                    .elapsed()
                    .as_millis() as u64;
                if elapsed_ms >= limit {
                    debug!("capture timeout elapsed ({elapsed_ms}ms >= {limit}ms)");
                    self.state = State::Download;
                    true
                } else {
                    false
                }
            }
            State::Stopping => {
                self.state = State::Download;
                true
            }
            State::Idle | State::Download => false,
        }
    }

    /// Called once the download path has drained DRAM and reported the
    /// capture complete: `Download -> Idle`.
    pub fn finish_download(&mut self) {
        self.state = State::Idle;
    }
}
