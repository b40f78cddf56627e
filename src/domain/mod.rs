pub mod allocation;
pub mod decision;
pub mod position;
pub mod signal;

pub use allocation::{AllocationResult, AllocationVector, EquityTier};
pub use decision::{AuthorizedIntent, BrainDecision, DecisionRing};
pub use position::{Position, PositionManager, PositionSide};
pub use signal::{IntentSignal, PhaseId, PositionMode, Side, SignalType};
