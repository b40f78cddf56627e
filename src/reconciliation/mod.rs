pub mod confidence;
pub mod service;

pub use confidence::{ConfidenceState, TruthConfidence};
pub use service::{Drift, DriftKind, ReconciliationReport, ReconciliationService};
