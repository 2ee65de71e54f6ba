//! The high-level trigger description this driver accepts from the
//! enclosing framework (`spec.md` §2.4 "Configuration surface",
//! §4.5 "High-level -> low-level").
//!
//! This mirrors the shape of `sr_trigger` / `sr_trigger_stage` /
//! `sr_trigger_match` in the original implementation, trimmed to the
//! match kinds the Sigma hardware can actually express. Only the first
//! stage of a [`TriggerModel`] is ever consulted — multi-stage boolean
//! expression triggers are an explicit non-goal (`spec.md` §1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchKind {
    /// Channel must read high.
    One,
    /// Channel must read low.
    Zero,
    /// Channel must transition low-to-high.
    Rising,
    /// Channel must transition high-to-low.
    Falling,
}

/// One channel's requirement within a [`TriggerStage`].
#[derive(Clone, Copy, Debug)]
pub struct TriggerMatch {
    pub channel: u8,
    pub kind: MatchKind,
}

/// A set of per-channel matches that must hold simultaneously.
#[derive(Clone, Debug, Default)]
pub struct TriggerStage {
    pub matches: Vec<TriggerMatch>,
}

/// A full trigger description. Only `stages[0]` matters to this driver.
#[derive(Clone, Debug, Default)]
pub struct TriggerModel {
    pub stages: Vec<TriggerStage>,
}

impl TriggerModel {
    /// An empty trigger: no stages, nothing armed.
    pub fn none() -> Self {
        TriggerModel::default()
    }

    pub fn first_stage(&self) -> Option<&TriggerStage> {
        self.stages.first()
    }
}
