//! Error taxonomy for the Brain.
//!
//! Mirrors the categories in the error-handling design: transient I/O is
//! retried by the caller, state conflicts and contract violations are
//! rejected at the boundary, gate rejections are a normal outcome (not an
//! error at all — see `GateVerdict`), safety divergence is escalated, and
//! fatal errors halt the signal processor while read endpoints stay live.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrainError {
    #[error("transient io: {0}")]
    TransientIo(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("gate rejected: {0}")]
    GateRejected(String),

    #[error("safety divergence: {0}")]
    SafetyDivergence(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl BrainError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrainError::TransientIo(_))
    }
}

pub type BrainResult<T> = Result<T, BrainError>;
