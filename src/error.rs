//! Error taxonomy returned to the enclosing measurement framework.
//!
//! Every fallible operation in this crate returns [`Result`], a thin alias
//! over [`Error`]. There are no implicit retries above the byte-link layer
//! (see `spec.md` §7) — callers that want retry semantics build them on
//! top of these variants.

use thiserror::Error;

/// Errors surfaced by the Sigma driver core.
#[derive(Debug, Error)]
pub enum Error {
    /// A read or write against the byte link failed.
    #[error("byte link I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded wait exceeded its deadline.
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What the driver was waiting for, e.g. `"INIT_B"` or `"POSTTRIGGERED"`.
        what: &'static str,
    },

    /// A handshake response did not match what the protocol requires.
    #[error("protocol mismatch during {stage}: expected 0x{expected:02x}, got 0x{actual:02x}")]
    Protocol {
        /// Human-readable name of the handshake step that failed.
        stage: &'static str,
        expected: u8,
        actual: u8,
    },

    /// The requested samplerate is not in the fixed supported table.
    #[error("unsupported samplerate: {0} Hz")]
    UnsupportedSamplerate(u64),

    /// The requested trigger configuration cannot be expressed by the
    /// device at the current samplerate.
    #[error("unsupported trigger configuration: {0}")]
    UnsupportedTrigger(&'static str),

    /// An internal invariant was about to be violated (e.g. a command
    /// buffer bound would have been exceeded). This signals a driver bug,
    /// not a device or link failure.
    #[error("internal bug: {0}")]
    InternalBug(&'static str),

    /// A firmware image exceeded the device's configuration memory size.
    #[error("firmware image too large: {len} bytes exceeds {limit} byte limit")]
    FirmwareTooLarge { len: usize, limit: usize },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
