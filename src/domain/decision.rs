//! AuthorizedIntent and BrainDecision — the outputs of `process(IntentSignal)`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::allocation::AllocationVector;
use crate::domain::signal::{IntentSignal, PhaseId};

/// Derived from an `IntentSignal`; `authorized_size == 0 <=> approved == false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedIntent {
    pub signal_id: String,
    pub phase_id: PhaseId,
    pub authorized_size: Decimal,
    pub approved: bool,
    pub allocation: AllocationVector,
    pub applied_modifier: f64,
    pub decision_reason: String,
    pub at: DateTime<Utc>,
}

impl AuthorizedIntent {
    pub fn rejected(signal: &IntentSignal, allocation: AllocationVector, reason: impl Into<String>) -> Self {
        Self {
            signal_id: signal.signal_id.clone(),
            phase_id: signal.phase_id,
            authorized_size: Decimal::ZERO,
            approved: false,
            allocation,
            applied_modifier: 1.0,
            decision_reason: reason.into(),
            at: Utc::now(),
        }
    }
}

/// A decision snapshot, appended to the event log and kept in a bounded
/// in-memory ring for audit/debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainDecision {
    pub signal: IntentSignal,
    pub intent: AuthorizedIntent,
    pub equity: Decimal,
    pub performance_modifier: f64,
    pub inference_scalar: f64,
    pub defcon_multiplier: f64,
}

impl BrainDecision {
    pub fn signal_id(&self) -> &str {
        &self.signal.signal_id
    }
}

/// Bounded ring of the most recent decisions, kept in memory purely for
/// fast audit/debug access. The event log is the durable, unbounded copy.
#[derive(Debug, Default)]
pub struct DecisionRing {
    capacity: usize,
    items: std::collections::VecDeque<BrainDecision>,
}

impl DecisionRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: std::collections::VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, decision: BrainDecision) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(decision);
    }

    pub fn find(&self, signal_id: &str) -> Option<&BrainDecision> {
        self.items.iter().find(|d| d.signal_id() == signal_id)
    }

    pub fn recent(&self) -> impl Iterator<Item = &BrainDecision> {
        self.items.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let mut ring = DecisionRing::new(2);
        for i in 0..3 {
            let signal = crate::domain::signal::IntentSignal {
                signal_id: format!("s{i}"),
                phase_id: PhaseId::P1,
                symbol: "BTC".into(),
                side: crate::domain::signal::Side::Buy,
                requested_size: Decimal::ONE,
                timestamp: Utc::now(),
                exchange: "x".into(),
                signal_type: crate::domain::signal::SignalType::Trade,
                position_mode: crate::domain::signal::PositionMode::OneWay,
                stop_price: None,
                entry_price: None,
            };
            let intent = AuthorizedIntent::rejected(&signal, AllocationVector::single_phase1(), "test");
            ring.push(BrainDecision {
                signal,
                intent,
                equity: Decimal::ZERO,
                performance_modifier: 1.0,
                inference_scalar: 1.0,
                defcon_multiplier: 1.0,
            });
        }
        assert_eq!(ring.len(), 2);
        assert!(ring.find("s0").is_none());
        assert!(ring.find("s2").is_some());
    }
}
