//! Injectable collaborator interfaces: every external dependency of the
//! Brain is a trait passed in at construction time instead of shared
//! global/dynamic state, so every collaborator is replaceable in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{AuthorizedIntent, PhaseId};
use crate::error::BrainResult;

/// Wall-clock abstraction so tests can control time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Best-effort notification of upstream phases. Errors are logged and
/// swallowed by the caller, never propagated.
#[async_trait]
pub trait PhaseNotifier: Send + Sync {
    async fn notify_veto(&self, phase_id: PhaseId, signal_id: &str, reason: &str);
    async fn notify_breaker_tripped(&self, reason: &str);
    async fn notify_breaker_reset(&self);
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl PhaseNotifier for TracingNotifier {
    async fn notify_veto(&self, phase_id: PhaseId, signal_id: &str, reason: &str) {
        tracing::info!(phase = phase_id.as_str(), signal_id, reason, "veto notified");
    }

    async fn notify_breaker_tripped(&self, reason: &str) {
        tracing::warn!(reason, "circuit breaker tripped");
    }

    async fn notify_breaker_reset(&self) {
        tracing::info!("circuit breaker reset");
    }
}

/// A position as reported by the venue, used only for reconciliation.
#[derive(Debug, Clone)]
pub struct ExecutionPosition {
    pub symbol: String,
    pub side: crate::domain::position::PositionSide,
    pub size: rust_decimal::Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Acked,
    Timeout,
}

/// The Execution collaborator: order routing/fills live entirely outside
/// the Brain; this is the contract the Brain calls against.
#[async_trait]
pub trait Execution: Send + Sync {
    async fn forward_signal(&self, intent: &AuthorizedIntent, authorized_size: rust_decimal::Decimal) -> Ack;
    async fn fetch_exchange_positions(&self, venue: &str) -> anyhow::Result<Vec<ExecutionPosition>>;
}

/// A no-op `Execution` used in tests and as a safe default before a real
/// venue adapter is wired in.
#[derive(Debug, Default)]
pub struct NullExecution;

#[async_trait]
impl Execution for NullExecution {
    async fn forward_signal(&self, _intent: &AuthorizedIntent, _authorized_size: rust_decimal::Decimal) -> Ack {
        Ack::Acked
    }

    async fn fetch_exchange_positions(&self, _venue: &str) -> anyhow::Result<Vec<ExecutionPosition>> {
        Ok(Vec::new())
    }
}

/// A stored event row, aggregate-ordered by `seq`.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub aggregate_id: String,
    pub seq: i64,
    pub event_type: String,
    pub payload: Value,
    pub ts: DateTime<Utc>,
    pub trace_id: String,
    pub version: i32,
}

/// Append-only event log, single-writer-per-aggregate.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(
        &self,
        aggregate_id: &str,
        event_type: &str,
        payload: Value,
        trace_id: &str,
    ) -> BrainResult<i64>;

    async fn replay(&self, aggregate_id: &str, from_seq: Option<i64>) -> BrainResult<Vec<StoredEvent>>;

    async fn max_seq(&self, aggregate_id: &str) -> BrainResult<i64>;
}

/// Hot-reloadable key-value bucket, backing the config overlay, circuit
/// breaker state, and the leader lease.
#[async_trait]
pub trait Kv: Send + Sync {
    async fn get(&self, key: &str) -> BrainResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> BrainResult<()>;
}

/// A `Kv` that never persists anything, used in tests that don't care
/// about write-through state.
#[derive(Debug, Default)]
pub struct NullKv;

#[async_trait]
impl Kv for NullKv {
    async fn get(&self, _key: &str) -> BrainResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> BrainResult<()> {
        Ok(())
    }
}
