//! Inbound intent signals and the small enums they are built from.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseId {
    P1,
    P2,
    P3,
}

impl PhaseId {
    /// P3 > P2 > P1, used directly as a priority rank.
    pub fn rank(self) -> u8 {
        match self {
            PhaseId::P1 => 0,
            PhaseId::P2 => 1,
            PhaseId::P3 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseId::P1 => "phase1",
            PhaseId::P2 => "phase2",
            PhaseId::P3 => "phase3",
        }
    }

    pub fn all() -> [PhaseId; 3] {
        [PhaseId::P1, PhaseId::P2, PhaseId::P3]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> i8 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn from_sign(sign: i32) -> Option<Side> {
        if sign > 0 {
            Some(Side::Buy)
        } else if sign < 0 {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionMode {
    OneWay,
    Hedge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Trade,
    Reconciliation,
}

impl Default for SignalType {
    fn default() -> Self {
        SignalType::Trade
    }
}

/// A signal produced by an upstream phase, consumed at most once by the Brain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentSignal {
    pub signal_id: String,
    pub phase_id: PhaseId,
    pub symbol: String,
    pub side: Side,
    pub requested_size: Decimal,
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub signal_type: SignalType,
    pub position_mode: PositionMode,
    /// Advisory stop price accompanying the signal, if any (checked by the risk guardian).
    pub stop_price: Option<Decimal>,
    pub entry_price: Option<Decimal>,
}

impl IntentSignal {
    /// Contract validation at the boundary: malformed signals never reach the gate chain.
    pub fn validate(&self) -> Result<(), String> {
        if self.requested_size <= Decimal::ZERO {
            return Err("requested_size must be positive".to_string());
        }
        if self.signal_id.trim().is_empty() {
            return Err("signal_id must not be empty".to_string());
        }
        Ok(())
    }

    pub fn signed_size(&self) -> Decimal {
        match self.side {
            Side::Buy => self.requested_size,
            Side::Sell => -self.requested_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ranks_are_ordered_p3_highest() {
        assert!(PhaseId::P3.rank() > PhaseId::P2.rank());
        assert!(PhaseId::P2.rank() > PhaseId::P1.rank());
    }

    #[test]
    fn rejects_non_positive_size() {
        let sig = IntentSignal {
            signal_id: "s1".into(),
            phase_id: PhaseId::P1,
            symbol: "BTC".into(),
            side: Side::Buy,
            requested_size: Decimal::ZERO,
            timestamp: Utc::now(),
            exchange: "binance".into(),
            signal_type: SignalType::Trade,
            position_mode: PositionMode::OneWay,
            stop_price: None,
            entry_price: None,
        };
        assert!(sig.validate().is_err());
    }
}
