//! Trigger compiler (C5): turns the framework-facing [`model::TriggerModel`]
//! into the low-level [`config::TriggerConfig`] and, at basic samplerates,
//! the LUT rows the FPGA evaluates (`spec.md` §4.5).

pub mod config;
pub mod lut;
pub mod model;

pub use config::TriggerConfig;
pub use lut::{build_basic_trigger, TriggerLut};
pub use model::{MatchKind, TriggerMatch, TriggerModel, TriggerStage};

use crate::error::Result;
use crate::link::ByteLink;
use crate::register::RegisterProtocol;
use crate::samplerate::Samplerate;

/// Compiles `model` for `rate` and, if it is a basic rate, also builds and
/// uploads the LUT rows it requires. At `>= 100 MHz` the device matches
/// the compiled edge condition directly and no LUT exists to upload.
pub fn compile_and_upload<L: ByteLink>(
    protocol: &mut RegisterProtocol<L>,
    model: &TriggerModel,
    rate: Samplerate,
) -> Result<TriggerConfig> {
    let cfg = config::compile(model, rate)?;
    if rate.as_hz() < config::HIGH_RATE_THRESHOLD_HZ {
        let built = lut::build_basic_trigger(&cfg);
        lut::upload(protocol, &built)?;
    }
    Ok(cfg)
}
