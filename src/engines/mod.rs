pub mod allocation_engine;
pub mod capital_flow;
pub mod circuit_breaker;
pub mod governance;
pub mod inference_engine;
pub mod performance_tracker;
pub mod risk_guardian;

pub use allocation_engine::allocate;
pub use capital_flow::{CapitalFlowManager, SweepOutcome};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
pub use governance::{DefconLevel, Governance, GovernanceConfig, HealthSignals};
pub use inference_engine::{InferenceConfig, InferenceEngine};
pub use performance_tracker::{PerformanceTracker, PhasePerformance};
pub use risk_guardian::{MarketSnapshot, RiskGuardian, RiskVerdict};
