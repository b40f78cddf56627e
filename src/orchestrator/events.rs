//! Tagged event variants published on a bounded channel, replacing the
//! EventEmitter/callback cross-wiring the system is built around
//! upstream. Subscribers consume from the receiver side; nothing is
//! invoked synchronously during a mutation.

use rust_decimal::Decimal;

use crate::domain::PhaseId;
use crate::engines::{CircuitState, DefconLevel};

#[derive(Debug, Clone)]
pub enum BrainEvent {
    DecisionRecorded {
        signal_id: String,
        phase_id: PhaseId,
        approved: bool,
        authorized_size: Decimal,
    },
    VetoIssued {
        signal_id: String,
        phase_id: PhaseId,
        reason: String,
    },
    CircuitBreakerTransition {
        from: CircuitState,
        to: CircuitState,
        reason: Option<String>,
    },
    DefconTransition {
        from: DefconLevel,
        to: DefconLevel,
    },
    ReconciliationDrift {
        scope: String,
        kind: String,
    },
    SweepCompleted {
        run_id: String,
        amount: Decimal,
    },
    LeadershipChanged {
        is_leader: bool,
    },
}

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub type BrainEventSender = tokio::sync::mpsc::Sender<BrainEvent>;
pub type BrainEventReceiver = tokio::sync::mpsc::Receiver<BrainEvent>;

pub fn channel() -> (BrainEventSender, BrainEventReceiver) {
    tokio::sync::mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
