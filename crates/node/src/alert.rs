//! Edge-triggered dry/wet classification.
//!
//! ```text
//!        percent < threshold
//!   Wet ─────────────────────▶ Dry
//!    ▲                          │
//!    └──────────────────────────┘
//!        percent >= threshold
//! ```
//!
//! The boundary is a single value with no dead band: a reading that
//! oscillates across the threshold flips the state on every cycle.

use crate::calibration::WetnessPercent;
use crate::threshold::Threshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AlertState {
    Wet,
    Dry,
}

impl AlertState {
    fn classify(percent: WetnessPercent, threshold: Threshold) -> Self {
        if percent < threshold.get() {
            Self::Dry
        } else {
            Self::Wet
        }
    }

    pub(crate) fn is_dry(self) -> bool {
        self == Self::Dry
    }

    /// Payload for the `status` topic.
    pub(crate) fn status(self) -> &'static str {
        match self {
            Self::Wet => "WET",
            Self::Dry => "DRY",
        }
    }

    /// Payload for the `alert` topic.
    pub(crate) fn directive(self) -> &'static str {
        match self {
            Self::Wet => "OK",
            Self::Dry => "WATER_NOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    BecameDry,
    BecameWet,
}

impl Transition {
    pub(crate) fn target(self) -> AlertState {
        match self {
            Self::BecameDry => AlertState::Dry,
            Self::BecameWet => AlertState::Wet,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AlertMachine {
    state: AlertState,
}

impl AlertMachine {
    /// Initial classification from the first reading.  Seeding is not a
    /// transition.
    pub(crate) fn seed(percent: WetnessPercent, threshold: Threshold) -> Self {
        Self {
            state: AlertState::classify(percent, threshold),
        }
    }

    pub(crate) fn state(&self) -> AlertState {
        self.state
    }

    /// Advance one cycle.  Returns the transition, if any.
    pub(crate) fn step(&mut self, percent: WetnessPercent, threshold: Threshold) -> Option<Transition> {
        let next = AlertState::classify(percent, threshold);
        let transition = match (self.state, next) {
            (AlertState::Wet, AlertState::Dry) => Some(Transition::BecameDry),
            (AlertState::Dry, AlertState::Wet) => Some(Transition::BecameWet),
            _ => None,
        };
        self.state = next;
        transition
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn t(v: i64) -> Threshold {
        Threshold::new(v).unwrap()
    }

    // -- seed ---------------------------------------------------------------

    #[test]
    fn seed_below_threshold_is_dry() {
        assert_eq!(AlertMachine::seed(34, t(35)).state(), AlertState::Dry);
    }

    #[test]
    fn seed_at_threshold_is_wet() {
        assert_eq!(AlertMachine::seed(35, t(35)).state(), AlertState::Wet);
    }

    // -- step ---------------------------------------------------------------

    #[test]
    fn sequence_emits_one_dry_and_one_wet() {
        let mut m = AlertMachine::seed(50, t(35));
        let transitions: Vec<_> = [40, 30, 45].iter().map(|&p| m.step(p, t(35))).collect();
        assert_eq!(
            transitions,
            vec![None, Some(Transition::BecameDry), Some(Transition::BecameWet)]
        );
        assert_eq!(m.state(), AlertState::Wet);
    }

    #[test]
    fn staying_dry_is_silent() {
        let mut m = AlertMachine::seed(10, t(35));
        for p in [5, 0, 20, 34] {
            assert_eq!(m.step(p, t(35)), None);
        }
        assert!(m.state().is_dry());
    }

    #[test]
    fn oscillating_at_boundary_flips_every_cycle() {
        let mut m = AlertMachine::seed(35, t(35));
        assert_eq!(m.step(34, t(35)), Some(Transition::BecameDry));
        assert_eq!(m.step(35, t(35)), Some(Transition::BecameWet));
        assert_eq!(m.step(34, t(35)), Some(Transition::BecameDry));
    }

    #[test]
    fn threshold_change_alone_can_trigger_transition() {
        let mut m = AlertMachine::seed(40, t(35));
        assert_eq!(m.step(40, t(50)), Some(Transition::BecameDry));
        assert_eq!(m.step(40, t(20)), Some(Transition::BecameWet));
    }

    // -- payloads -----------------------------------------------------------

    #[test]
    fn telemetry_payloads() {
        assert_eq!(AlertState::Dry.status(), "DRY");
        assert_eq!(AlertState::Dry.directive(), "WATER_NOW");
        assert_eq!(AlertState::Wet.status(), "WET");
        assert_eq!(AlertState::Wet.directive(), "OK");
        assert_eq!(Transition::BecameDry.target(), AlertState::Dry);
    }
}
