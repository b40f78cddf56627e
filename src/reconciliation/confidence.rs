//! `TruthConfidence`: slow-recover / fast-decay belief that the Brain's
//! model matches reality for a given scope.
//!
//! Slow-climb, fast-drop, clamped-to-a-fixed-range threshold-crossing
//! shape repurposed from an equity ratio to a belief score.

use serde::{Deserialize, Serialize};

const DECAY_ON_MISMATCH: f64 = 0.2;
const RECOVER_ON_MATCH: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceState {
    High,
    Degraded,
    Low,
}

impl ConfidenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceState::High => "HIGH",
            ConfidenceState::Degraded => "DEGRADED",
            ConfidenceState::Low => "LOW",
        }
    }
}

fn state_for(score: f64) -> ConfidenceState {
    if score >= 0.8 {
        ConfidenceState::High
    } else if score >= 0.5 {
        ConfidenceState::Degraded
    } else {
        ConfidenceState::Low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthConfidence {
    pub scope: String,
    pub score: f64,
    pub state: ConfidenceState,
    pub reasons: Vec<String>,
}

impl TruthConfidence {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            score: 1.0,
            state: ConfidenceState::High,
            reasons: Vec::new(),
        }
    }

    pub fn on_mismatch(&mut self, reason: impl Into<String>) {
        self.score = (self.score - DECAY_ON_MISMATCH).max(0.0);
        self.state = state_for(self.score);
        self.reasons = vec![reason.into()];
    }

    pub fn on_clean_match(&mut self) {
        self.score = (self.score + RECOVER_ON_MATCH).min(1.0);
        self.state = state_for(self.score);
        self.reasons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_high() {
        let conf = TruthConfidence::new("binance");
        assert_eq!(conf.state, ConfidenceState::High);
        assert_eq!(conf.score, 1.0);
    }

    #[test]
    fn mismatch_decays_by_0_2() {
        let mut conf = TruthConfidence::new("binance");
        conf.on_mismatch("recent_mismatch");
        assert!((conf.score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn k_consecutive_clean_runs_meet_the_floor() {
        let mut conf = TruthConfidence::new("binance");
        conf.on_mismatch("recent_mismatch");
        let score0 = conf.score;
        for _ in 0..5 {
            conf.on_clean_match();
        }
        assert!(conf.score >= (score0 + 0.01 * 5.0).min(1.0) - 1e-9);
    }

    #[test]
    fn state_thresholds() {
        assert_eq!(state_for(0.9), ConfidenceState::High);
        assert_eq!(state_for(0.6), ConfidenceState::Degraded);
        assert_eq!(state_for(0.3), ConfidenceState::Low);
    }
}
