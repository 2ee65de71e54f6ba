//! Low-level trigger configuration: the bit-masks the device's trigger
//! LUTs are ultimately built from (`spec.md` §3 "Trigger config",
//! §4.5 "High-level -> low-level").

use log::trace;

use crate::error::{Error, Result};
use crate::samplerate::Samplerate;
use crate::trigger::model::{MatchKind, TriggerModel};

/// Rate at or above which only a single edge trigger (and no value/mask
/// trigger) is supported.
pub(crate) const HIGH_RATE_THRESHOLD_HZ: u64 = 100_000_000;

/// Bit-masks over the 16 channels describing what the device should
/// trigger on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TriggerConfig {
    pub simple_value: u16,
    pub simple_mask: u16,
    pub rising_mask: u16,
    pub falling_mask: u16,
}

impl TriggerConfig {
    /// No trigger configured at all.
    pub fn none() -> Self {
        TriggerConfig::default()
    }

    /// Whether any rising/falling/value-mask condition is configured.
    pub fn is_armed(&self) -> bool {
        self.simple_mask != 0 || self.rising_mask != 0 || self.falling_mask != 0
    }
}

/// Folds the first stage of `model` into a [`TriggerConfig`], validating
/// it against the samplerate-dependent limits in `spec.md` §3:
///
/// - At `>= 100 MHz`: at most one rising/falling bit total, and no
///   value/mask match at all.
/// - At `<= 50 MHz`: at most two rising/falling bits total (value/mask
///   matches are unrestricted in count).
pub fn compile(model: &TriggerModel, rate: Samplerate) -> Result<TriggerConfig> {
    let mut cfg = TriggerConfig::none();
    let mut edge_tally = 0u32;

    if let Some(stage) = model.first_stage() {
        for m in &stage.matches {
            let bit = 1u16 << m.channel;
            match m.kind {
                MatchKind::One => {
                    cfg.simple_value |= bit;
                    cfg.simple_mask |= bit;
                }
                MatchKind::Zero => {
                    cfg.simple_value &= !bit;
                    cfg.simple_mask |= bit;
                }
                MatchKind::Rising => {
                    cfg.rising_mask |= bit;
                    edge_tally += 1;
                }
                MatchKind::Falling => {
                    cfg.falling_mask |= bit;
                    edge_tally += 1;
                }
            }
        }
    }

    if rate.as_hz() >= HIGH_RATE_THRESHOLD_HZ {
        if edge_tally > 1 {
            return Err(Error::UnsupportedTrigger(
                "only a single rising/falling trigger is supported at >=100MHz",
            ));
        }
        if cfg.simple_mask != 0 {
            return Err(Error::UnsupportedTrigger(
                "value/mask triggers are not supported at >=100MHz",
            ));
        }
    } else if edge_tally > 2 {
        return Err(Error::UnsupportedTrigger(
            "at most two rising/falling triggers are supported at <=50MHz",
        ));
    }

    trace!("compiled trigger config: {:?}", cfg);
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::model::{TriggerMatch, TriggerStage};

    fn model_of(matches: Vec<TriggerMatch>) -> TriggerModel {
        TriggerModel {
            stages: vec![TriggerStage { matches }],
        }
    }

    #[test]
    fn empty_model_compiles_to_no_trigger() {
        let cfg = compile(&TriggerModel::none(), Samplerate::Mhz1).unwrap();
        assert!(!cfg.is_armed());
    }

    #[test]
    fn value_mask_trigger_at_basic_rate() {
        let matches = vec![
            TriggerMatch { channel: 0, kind: MatchKind::One },
            TriggerMatch { channel: 1, kind: MatchKind::Zero },
        ];
        let cfg = compile(&model_of(matches), Samplerate::Mhz50).unwrap();
        assert_eq!(cfg.simple_mask, 0b11);
        assert_eq!(cfg.simple_value, 0b01);
    }

    #[test]
    fn two_edges_allowed_at_basic_rate() {
        let matches = vec![
            TriggerMatch { channel: 0, kind: MatchKind::Rising },
            TriggerMatch { channel: 5, kind: MatchKind::Falling },
        ];
        let cfg = compile(&model_of(matches), Samplerate::Mhz10).unwrap();
        assert_eq!(cfg.rising_mask, 1 << 0);
        assert_eq!(cfg.falling_mask, 1 << 5);
    }

    #[test]
    fn three_edges_rejected_at_basic_rate() {
        let matches = vec![
            TriggerMatch { channel: 0, kind: MatchKind::Rising },
            TriggerMatch { channel: 1, kind: MatchKind::Rising },
            TriggerMatch { channel: 2, kind: MatchKind::Falling },
        ];
        assert!(matches!(
            compile(&model_of(matches), Samplerate::Mhz10),
            Err(Error::UnsupportedTrigger(_))
        ));
    }

    #[test]
    fn high_rate_rejects_value_mask() {
        let matches = vec![TriggerMatch { channel: 3, kind: MatchKind::One }];
        assert!(matches!(
            compile(&model_of(matches), Samplerate::Mhz200),
            Err(Error::UnsupportedTrigger(_))
        ));
    }

    #[test]
    fn high_rate_allows_single_edge() {
        let matches = vec![TriggerMatch { channel: 3, kind: MatchKind::Rising }];
        let cfg = compile(&model_of(matches), Samplerate::Mhz200).unwrap();
        assert_eq!(cfg.rising_mask, 1 << 3);
    }

    #[test]
    fn high_rate_rejects_two_edges() {
        let matches = vec![
            TriggerMatch { channel: 1, kind: MatchKind::Rising },
            TriggerMatch { channel: 2, kind: MatchKind::Falling },
        ];
        assert!(matches!(
            compile(&model_of(matches), Samplerate::Mhz100),
            Err(Error::UnsupportedTrigger(_))
        ));
    }
}
