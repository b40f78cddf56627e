//! Allocation vectors and equity tiers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquityTier {
    Micro,
    Small,
    Medium,
    Large,
    Institutional,
}

impl EquityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EquityTier::Micro => "MICRO",
            EquityTier::Small => "SMALL",
            EquityTier::Medium => "MEDIUM",
            EquityTier::Large => "LARGE",
            EquityTier::Institutional => "INSTITUTIONAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationVector {
    pub w1: f64,
    pub w2: f64,
    pub w3: f64,
}

impl AllocationVector {
    pub const EPSILON: f64 = 1e-9;

    pub fn single_phase1() -> Self {
        Self {
            w1: 1.0,
            w2: 0.0,
            w3: 0.0,
        }
    }

    pub fn weight_for(&self, phase: crate::domain::signal::PhaseId) -> f64 {
        match phase {
            crate::domain::signal::PhaseId::P1 => self.w1,
            crate::domain::signal::PhaseId::P2 => self.w2,
            crate::domain::signal::PhaseId::P3 => self.w3,
        }
    }

    pub fn sums_to_one(&self) -> bool {
        (self.w1 + self.w2 + self.w3 - 1.0).abs() < Self::EPSILON
            && self.w1 >= 0.0
            && self.w2 >= 0.0
            && self.w3 >= 0.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocationResult {
    pub vector: AllocationVector,
    pub tier: EquityTier,
    pub max_leverage: f64,
    pub degraded: bool,
    pub equity: Decimal,
}
