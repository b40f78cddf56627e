//! Signal Processor / Brain Orchestrator: the central coordinator.
//! Contract: `process(IntentSignal) -> BrainDecision`.
//!
//! Collaborators are wired once at startup into `BrainContext` (see
//! `orchestrator::context`) rather than held as process-globals. The
//! idempotency map and approval-rate counters reuse the same
//! ring-buffer-with-eviction shape as the performance tracker's windows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::collaborators::{Ack, Clock, EventStore, Execution, Kv, PhaseNotifier};
use crate::config::BrainConfig;
use crate::domain::{
    AllocationVector, AuthorizedIntent, BrainDecision, DecisionRing, IntentSignal, PhaseId, PositionManager, Side,
};
use crate::engines::allocation_engine::allocate;
use crate::engines::{CircuitBreaker, DefconLevel, Governance, InferenceEngine, MarketSnapshot, PerformanceTracker, RiskGuardian};
use crate::orchestrator::events::{BrainEvent, BrainEventSender};
use crate::orchestrator::queue::PriorityQueue;

#[derive(Debug, Clone, Copy, Default)]
pub struct ApprovalCounter {
    pub approved: u64,
    pub total: u64,
}

impl ApprovalCounter {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.approved as f64 / self.total as f64
        }
    }
}

struct IdempotencyEntry {
    decision: BrainDecision,
    recorded_at: DateTime<Utc>,
}

/// Everything mutated exclusively by the SignalProcessor loop (or an
/// event-replay loop under the same lock): `PositionManager`,
/// `CircuitBreaker`, and the per-phase approval counters.
pub struct SignalProcessorCore {
    pub positions: PositionManager,
    pub breaker: CircuitBreaker,
    pub approval_counters: HashMap<PhaseId, ApprovalCounter>,
    pub decisions: DecisionRing,
    idempotency: HashMap<String, IdempotencyEntry>,
    pub equity: Decimal,
}

impl SignalProcessorCore {
    pub fn new(breaker: CircuitBreaker, equity: Decimal, decision_ring_capacity: usize) -> Self {
        Self {
            positions: PositionManager::new(),
            breaker,
            approval_counters: HashMap::new(),
            decisions: DecisionRing::new(decision_ring_capacity),
            idempotency: HashMap::new(),
            equity,
        }
    }

    fn record_approval(&mut self, phase: PhaseId, approved: bool) {
        let counter = self.approval_counters.entry(phase).or_default();
        counter.total += 1;
        if approved {
            counter.approved += 1;
        }
    }

    pub fn approval_rate(&self, phase: PhaseId) -> f64 {
        self.approval_counters.get(&phase).copied().unwrap_or_default().rate()
    }

    pub fn all_approval_rates(&self) -> HashMap<PhaseId, f64> {
        PhaseId::all()
            .iter()
            .map(|p| (*p, self.approval_rate(*p)))
            .collect()
    }

    fn sweep_idempotency(&mut self, now: DateTime<Utc>, ttl_secs: i64) {
        self.idempotency
            .retain(|_, entry| now - entry.recorded_at < chrono::Duration::seconds(ttl_secs));
    }
}

/// The full signal-processing pipeline: engines, collaborators, and the single-writer core.
pub struct SignalProcessor {
    cfg: BrainConfig,
    core: tokio::sync::Mutex<SignalProcessorCore>,
    queue: tokio::sync::Mutex<PriorityQueue>,
    performance: tokio::sync::Mutex<PerformanceTracker>,
    inference: tokio::sync::Mutex<InferenceEngine>,
    governance: tokio::sync::Mutex<Governance>,
    risk_guardian: RiskGuardian,
    market: parking_lot::RwLock<MarketSnapshot>,
    clock: Arc<dyn Clock>,
    event_store: Arc<dyn EventStore>,
    notifier: Arc<dyn PhaseNotifier>,
    execution: Arc<dyn Execution>,
    events_tx: BrainEventSender,
    kv: Arc<dyn Kv>,
}

const BREAKER_STATE_KEY: &str = "breaker.state";
const PERFORMANCE_RING_KEY: &str = "performance.ring";

impl SignalProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: BrainConfig,
        breaker: CircuitBreaker,
        performance: PerformanceTracker,
        inference: InferenceEngine,
        governance: Governance,
        clock: Arc<dyn Clock>,
        event_store: Arc<dyn EventStore>,
        notifier: Arc<dyn PhaseNotifier>,
        execution: Arc<dyn Execution>,
        events_tx: BrainEventSender,
        kv: Arc<dyn Kv>,
    ) -> Self {
        let equity = cfg.initial_equity;
        let max_queue_size = cfg.brain.max_queue_size;
        let risk_guardian = RiskGuardian::new(cfg.risk.clone());
        Self {
            core: tokio::sync::Mutex::new(SignalProcessorCore::new(breaker, equity, 50)),
            queue: tokio::sync::Mutex::new(PriorityQueue::new(max_queue_size)),
            performance: tokio::sync::Mutex::new(performance),
            inference: tokio::sync::Mutex::new(inference),
            governance: tokio::sync::Mutex::new(governance),
            risk_guardian,
            market: parking_lot::RwLock::new(MarketSnapshot::default()),
            clock,
            event_store,
            notifier,
            execution,
            events_tx,
            kv,
            cfg,
        }
    }

    /// Write-through persistence of the breaker's current state. Called on
    /// every transition so a TRIPPED/Cooldown state survives a restart.
    async fn persist_breaker_state(&self, core: &SignalProcessorCore) {
        if let Ok(raw) = serde_json::to_string(core.breaker.state()) {
            let _ = self.kv.set(BREAKER_STATE_KEY, &raw).await;
        }
    }

    /// Write-through persistence of the performance ring. Called on every
    /// `record_trade_outcome`.
    async fn persist_performance_ring(&self) {
        let raw = self.performance.lock().await.snapshot_json();
        let _ = self.kv.set(PERFORMANCE_RING_KEY, &raw).await;
    }

    pub fn market_snapshot(&self) -> &parking_lot::RwLock<MarketSnapshot> {
        &self.market
    }

    /// Feeds a fresh equity reading into the core and the circuit breaker,
    /// returning a trip reason the moment CLOSED -> TRIPPED happens.
    pub async fn record_equity(&self, equity: Decimal) -> Option<String> {
        let now = self.clock.now();
        let mut core = self.core.lock().await;
        let was_tripped = core.breaker.is_tripped();
        core.equity = equity;
        let reason = core.breaker.record_equity(equity, now);
        if !was_tripped && core.breaker.is_tripped() {
            self.notifier
                .notify_breaker_tripped(reason.as_deref().unwrap_or("unknown"))
                .await;
            let _ = self
                .events_tx
                .send(BrainEvent::CircuitBreakerTransition {
                    from: crate::engines::CircuitState::Closed,
                    to: crate::engines::CircuitState::Tripped,
                    reason: reason.clone(),
                })
                .await;
        } else if was_tripped && !core.breaker.is_tripped() {
            self.notifier.notify_breaker_reset().await;
        }
        self.persist_breaker_state(&core).await;
        reason
    }

    pub async fn reset_breaker(&self, operator_id: &str) {
        let mut core = self.core.lock().await;
        core.breaker.reset(operator_id);
        self.persist_breaker_state(&core).await;
        drop(core);
        self.notifier.notify_breaker_reset().await;
    }

    pub async fn record_trade_outcome(&self, phase: PhaseId, pnl: f64, symbol: &str, side: &str) {
        self.performance.lock().await.record(phase, pnl, symbol, side, &*self.clock);
        self.persist_performance_ring().await;
        let mut core = self.core.lock().await;
        let now = self.clock.now();
        if pnl < 0.0 {
            core.breaker.record_trade_loss(now);
        } else {
            core.breaker.record_trade_win();
        }
        self.persist_breaker_state(&core).await;
    }

    pub async fn record_inference_outcome(&self, phase: PhaseId, outcome: f64) {
        self.inference.lock().await.record(phase, outcome);
    }

    pub async fn update_governance(&self, signals: crate::engines::HealthSignals) -> DefconLevel {
        let now = self.clock.now();
        self.governance.lock().await.update(signals, now)
    }

    pub async fn approval_rates(&self) -> HashMap<PhaseId, f64> {
        self.core.lock().await.all_approval_rates()
    }

    pub async fn equity(&self) -> Decimal {
        self.core.lock().await.equity
    }

    pub async fn positions_snapshot(&self) -> PositionManager {
        self.core.lock().await.positions.clone()
    }

    /// Restores position book, equity, and circuit breaker state from a
    /// recovered snapshot. Called once on startup/promotion, before the
    /// queue drain loop is allowed to run.
    pub async fn restore_from_snapshot(&self, payload: &crate::store::SnapshotPayload) {
        let mut core = self.core.lock().await;
        core.positions = payload.positions.clone();
        core.breaker = CircuitBreaker::restore(self.cfg.breaker.clone(), payload.circuit_breaker_state.clone());
    }

    /// Applies a confirmed fill to the in-memory `PositionManager`. The
    /// only mutation path for positions outside of replay — authorization
    /// alone never changes book state.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_fill(
        &self,
        symbol: &str,
        phase: PhaseId,
        exchange: &str,
        side: crate::domain::position::PositionSide,
        fill_size: Decimal,
        fill_price: Decimal,
        leverage: f64,
    ) {
        self.core
            .lock()
            .await
            .positions
            .apply_fill(symbol, phase, exchange, side, fill_size, fill_price, leverage);
    }

    pub async fn enqueue(&self, signal: IntentSignal) {
        let now = self.clock.now();
        let mut queue = self.queue.lock().await;
        queue.push(signal, now);
    }

    pub async fn queue_drop_count(&self) -> u64 {
        self.queue.lock().await.drop_count
    }

    /// Drains and processes everything currently queued, highest priority first.
    pub async fn drain_queue(&self) -> Vec<BrainDecision> {
        let mut signals = Vec::new();
        {
            let mut queue = self.queue.lock().await;
            while let Some(signal) = queue.pop() {
                signals.push(signal);
            }
        }
        let mut decisions = Vec::with_capacity(signals.len());
        for signal in signals {
            decisions.push(self.process(signal).await);
        }
        decisions
    }

    /// `process(IntentSignal) -> BrainDecision`: dedup, query chain, gate, record.
    pub async fn process(&self, signal: IntentSignal) -> BrainDecision {
        if let Err(reason) = signal.validate() {
            return self.reject_without_gate(signal, reason);
        }

        let now = self.clock.now();
        {
            let mut core = self.core.lock().await;
            core.sweep_idempotency(now, self.cfg.brain.idempotency_ttl_secs);
            if let Some(entry) = core.idempotency.get(&signal.signal_id) {
                return entry.decision.clone();
            }
        }

        let timeout = StdDuration::from_millis(self.cfg.brain.signal_timeout_ms);
        let decision = match tokio::time::timeout(timeout, self.run_gate_chain(&signal)).await {
            Ok(decision) => decision,
            Err(_) => self.build_decision(
                &signal,
                AuthorizedIntent::rejected(&signal, AllocationVector::single_phase1(), "gate_timeout"),
                Decimal::ZERO,
                1.0,
                1.0,
                1.0,
            ),
        };

        self.finalize(signal, decision).await
    }

    async fn run_gate_chain(&self, signal: &IntentSignal) -> BrainDecision {
        let (equity, breaker_tripped, breaker_reason) = {
            let core = self.core.lock().await;
            (core.equity, core.breaker.is_tripped(), core.breaker.rejection_reason())
        };

        if breaker_tripped {
            let reason = breaker_reason.unwrap_or_else(|| "circuit_breaker".to_string());
            return self.build_decision(
                signal,
                AuthorizedIntent::rejected(signal, AllocationVector::single_phase1(), reason),
                equity,
                1.0,
                1.0,
                1.0,
            );
        }

        let allocation = allocate(equity, &self.cfg.allocation);
        if allocation.degraded {
            return self.build_decision(
                signal,
                AuthorizedIntent::rejected(signal, allocation.vector, "invalid_equity"),
                equity,
                1.0,
                1.0,
                1.0,
            );
        }

        let performance_modifier = self.performance.lock().await.modifier(signal.phase_id);
        let predicted_outcome = 0.5; // no forward-looking prediction model is in scope; neutral bin.
        let inference_scalar = self.inference.lock().await.scalar(signal.phase_id, predicted_outcome);
        let defcon = self.governance.lock().await.current();

        let weight = allocation.vector.weight_for(signal.phase_id);
        let equity_cap = equity * Decimal::from_f64_retain(weight).unwrap_or(Decimal::ZERO);

        let candidate = signal.requested_size
            * Decimal::from_f64_retain(performance_modifier).unwrap_or(Decimal::ONE)
            * Decimal::from_f64_retain(inference_scalar).unwrap_or(Decimal::ONE);
        let mut clamp_note = String::new();
        let candidate = if candidate > equity_cap {
            clamp_note = "clamped".to_string();
            equity_cap
        } else {
            candidate
        };

        if !defcon.can_open_new_position() {
            return self.build_decision(
                signal,
                AuthorizedIntent::rejected(signal, allocation.vector, "defcon_critical"),
                equity,
                performance_modifier,
                inference_scalar,
                defcon.leverage_multiplier(),
            );
        }

        let market = self.market.read().clone();
        let verdict = {
            let core = self.core.lock().await;
            self.risk_guardian.evaluate(
                signal,
                &core.positions,
                candidate,
                equity,
                weight,
                allocation.max_leverage,
                defcon,
                &market,
            )
        };

        if !verdict.approved {
            return self.build_decision(
                signal,
                AuthorizedIntent::rejected(signal, allocation.vector, verdict.reason),
                equity,
                performance_modifier,
                inference_scalar,
                defcon.leverage_multiplier(),
            );
        }

        let authorized_size = verdict.authorized_base_size.min(signal.requested_size);
        let reason = if clamp_note.is_empty() {
            "approved".to_string()
        } else {
            format!("approved:{clamp_note}")
        };

        let intent = AuthorizedIntent {
            signal_id: signal.signal_id.clone(),
            phase_id: signal.phase_id,
            authorized_size,
            approved: authorized_size > Decimal::ZERO,
            allocation: allocation.vector,
            applied_modifier: performance_modifier * inference_scalar,
            decision_reason: reason,
            at: self.clock.now(),
        };

        self.build_decision(
            signal,
            intent,
            equity,
            performance_modifier,
            inference_scalar,
            defcon.leverage_multiplier(),
        )
    }

    fn build_decision(
        &self,
        signal: &IntentSignal,
        intent: AuthorizedIntent,
        equity: Decimal,
        performance_modifier: f64,
        inference_scalar: f64,
        defcon_multiplier: f64,
    ) -> BrainDecision {
        BrainDecision {
            signal: signal.clone(),
            intent,
            equity,
            performance_modifier,
            inference_scalar,
            defcon_multiplier,
        }
    }

    fn reject_without_gate(&self, signal: IntentSignal, reason: String) -> BrainDecision {
        let intent = AuthorizedIntent::rejected(&signal, AllocationVector::single_phase1(), reason);
        BrainDecision {
            signal,
            intent,
            equity: Decimal::ZERO,
            performance_modifier: 1.0,
            inference_scalar: 1.0,
            defcon_multiplier: 1.0,
        }
    }

    /// Authorize/veto, append the event, and update rings + approval counters.
    async fn finalize(&self, signal: IntentSignal, decision: BrainDecision) -> BrainDecision {
        if decision.intent.approved {
            let ack = self.execution.forward_signal(&decision.intent, decision.intent.authorized_size).await;
            if ack == Ack::Timeout {
                let _ = self
                    .event_store
                    .append(&signal.signal_id, "SignalEmittedPendingAck", json!({}), &signal.signal_id)
                    .await;
            }
        } else {
            self.notifier
                .notify_veto(signal.phase_id, &signal.signal_id, &decision.intent.decision_reason)
                .await;
            let _ = self
                .events_tx
                .send(BrainEvent::VetoIssued {
                    signal_id: signal.signal_id.clone(),
                    phase_id: signal.phase_id,
                    reason: decision.intent.decision_reason.clone(),
                })
                .await;
        }

        let payload = serde_json::to_value(&decision).unwrap_or(json!({}));
        let _ = self
            .event_store
            .append(&signal.signal_id, "BrainDecisionRecorded", payload, &signal.signal_id)
            .await;

        {
            let mut core = self.core.lock().await;
            core.record_approval(signal.phase_id, decision.intent.approved);
            core.decisions.push(decision.clone());
            core.idempotency.insert(
                signal.signal_id.clone(),
                IdempotencyEntry {
                    decision: decision.clone(),
                    recorded_at: self.clock.now(),
                },
            );
        }

        let _ = self
            .events_tx
            .send(BrainEvent::DecisionRecorded {
                signal_id: signal.signal_id,
                phase_id: decision.signal.phase_id,
                approved: decision.intent.approved,
                authorized_size: decision.intent.authorized_size,
            })
            .await;

        decision
    }

    /// Batch netting: groups same-symbol signals, authorizes the net
    /// side/size through the normal single-signal path, and still records
    /// a decision for every original signal.
    pub async fn process_batch(&self, signals: Vec<IntentSignal>) -> Vec<BrainDecision> {
        let mut by_symbol: HashMap<String, Vec<IntentSignal>> = HashMap::new();
        for signal in signals {
            by_symbol.entry(signal.symbol.clone()).or_default().push(signal);
        }

        let mut decisions = Vec::new();
        for (_symbol, group) in by_symbol {
            let net: Decimal = group.iter().map(|s| s.signed_size()).sum();
            if net == Decimal::ZERO {
                for signal in group {
                    decisions.push(self.reject_without_gate(signal, "neutral_net".to_string()));
                }
                continue;
            }

            let side = if net.is_sign_negative() { Side::Sell } else { Side::Buy };
            let net_size = net.abs();
            let representative = group[0].clone();
            let mut net_signal = representative.clone();
            net_signal.side = side;
            net_signal.requested_size = net_size;

            let net_decision = self.process(net_signal).await;
            for signal in group {
                let mut decision = net_decision.clone();
                decision.signal = signal;
                decisions.push(decision);
            }
        }
        decisions
    }
}
