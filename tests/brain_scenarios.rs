//! End-to-end scenarios exercising the full gate chain through the public
//! `SignalProcessor` API rather than any single engine in isolation.

use std::sync::Arc;

use brain::collaborators::{Clock, ExecutionPosition, NullExecution, NullKv, SystemClock, TracingNotifier};
use brain::config::BrainConfig;
use brain::domain::position::PositionSide;
use brain::domain::{IntentSignal, PhaseId, PositionMode, Side, SignalType};
use brain::engines::{CircuitBreaker, Governance, GovernanceConfig, InferenceConfig, InferenceEngine, PerformanceTracker};
use brain::orchestrator::events;
use brain::orchestrator::SignalProcessor;
use brain::reconciliation::ReconciliationService;
use brain::store::SqliteEventStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn event_store() -> (Arc<SqliteEventStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenarios.db");
    (Arc::new(SqliteEventStore::open(path.to_str().unwrap()).unwrap()), dir)
}

async fn processor_with_equity(equity: Decimal) -> Arc<SignalProcessor> {
    let mut cfg = BrainConfig::from_env().unwrap();
    cfg.initial_equity = equity;
    let (event_store, _dir) = event_store();
    let (events_tx, _rx) = events::channel();
    let breaker = CircuitBreaker::new(cfg.breaker.clone(), cfg.initial_equity);
    let performance = PerformanceTracker::new(cfg.performance.clone());
    let inference = InferenceEngine::new(InferenceConfig::default());
    let governance = Governance::new(GovernanceConfig::default());
    Arc::new(SignalProcessor::new(
        cfg,
        breaker,
        performance,
        inference,
        governance,
        Arc::new(SystemClock),
        event_store,
        Arc::new(TracingNotifier),
        Arc::new(NullExecution),
        events_tx,
        Arc::new(NullKv),
    ))
}

fn signal(id: &str, symbol: &str, side: Side, size: Decimal) -> IntentSignal {
    IntentSignal {
        signal_id: id.to_string(),
        phase_id: PhaseId::P1,
        symbol: symbol.to_string(),
        side,
        requested_size: size,
        timestamp: SystemClock.now(),
        exchange: "binance".to_string(),
        signal_type: SignalType::Trade,
        position_mode: PositionMode::OneWay,
        stop_price: None,
        entry_price: None,
    }
}

/// Below tier-2 threshold, every dollar of equity routes through phase1 alone.
#[tokio::test]
async fn below_tier2_allocation_routes_everything_to_phase1() {
    let processor = processor_with_equity(dec!(1000)).await;
    let decision = processor.process(signal("s1", "BTC", Side::Buy, dec!(1))).await;
    assert!(decision.intent.approved);
    assert_eq!(decision.intent.allocation.w1, 1.0);
    assert_eq!(decision.intent.allocation.w2, 0.0);
}

/// A requested size beyond the phase's equity-weighted cap is clamped, not rejected.
#[tokio::test]
async fn oversized_request_is_clamped_to_the_equity_cap() {
    let processor = processor_with_equity(dec!(1000)).await;
    let decision = processor.process(signal("s1", "BTC", Side::Buy, dec!(2000))).await;
    assert!(decision.intent.approved);
    assert_eq!(decision.intent.authorized_size, dec!(1000));
    assert!(decision.intent.decision_reason.contains("clamped"));
}

/// A circuit breaker trip at >15% daily drawdown rejects every subsequent signal.
#[tokio::test]
async fn circuit_breaker_trip_rejects_all_signals() {
    let processor = processor_with_equity(dec!(1000)).await;
    let trip_reason = processor.record_equity(dec!(849)).await;
    assert_eq!(trip_reason, Some("daily_drawdown".to_string()));

    let decision = processor.process(signal("s1", "BTC", Side::Buy, dec!(1))).await;
    assert!(!decision.intent.approved);
    assert!(decision.intent.decision_reason.starts_with("circuit_breaker"));
}

/// A circuit breaker just below the trip threshold stays closed.
#[tokio::test]
async fn circuit_breaker_stays_closed_just_under_threshold() {
    let processor = processor_with_equity(dec!(1000)).await;
    let trip_reason = processor.record_equity(dec!(851)).await;
    assert_eq!(trip_reason, None);

    let decision = processor.process(signal("s1", "BTC", Side::Buy, dec!(1))).await;
    assert!(decision.intent.approved);
}

/// Two opposite-side signals on the same symbol that fully net out are both rejected as neutral.
#[tokio::test]
async fn batch_netting_rejects_fully_offsetting_signals() {
    let processor = processor_with_equity(dec!(10_000)).await;
    let batch = vec![
        signal("buy-1", "BTC", Side::Buy, dec!(1)),
        signal("sell-1", "BTC", Side::Sell, dec!(1)),
    ];
    let decisions = processor.process_batch(batch).await;
    assert_eq!(decisions.len(), 2);
    assert!(decisions.iter().all(|d| !d.intent.approved));
    assert!(decisions.iter().all(|d| d.intent.decision_reason == "neutral_net"));
}

/// A net-nonzero batch authorizes through the normal single-signal path and
/// records a decision for every original signal in the group.
#[tokio::test]
async fn batch_netting_authorizes_the_residual_and_records_every_signal() {
    let processor = processor_with_equity(dec!(10_000)).await;
    let batch = vec![
        signal("buy-1", "BTC", Side::Buy, dec!(3)),
        signal("sell-1", "BTC", Side::Sell, dec!(1)),
    ];
    let decisions = processor.process_batch(batch).await;
    assert_eq!(decisions.len(), 2);
    assert!(decisions.iter().all(|d| d.intent.approved));
    assert_eq!(decisions[0].intent.authorized_size, decisions[1].intent.authorized_size);
}

struct MissingExchangePosition;

#[async_trait]
impl brain::collaborators::Execution for MissingExchangePosition {
    async fn forward_signal(&self, _intent: &brain::domain::AuthorizedIntent, _authorized_size: Decimal) -> brain::collaborators::Ack {
        brain::collaborators::Ack::Acked
    }

    async fn fetch_exchange_positions(&self, _venue: &str) -> anyhow::Result<Vec<ExecutionPosition>> {
        Ok(Vec::new())
    }
}

/// A position the Brain believes exists but the venue has no record of is a
/// ghost position: it is flagged and, with auto-resolve on, closed through
/// the normal signal pipeline rather than patched in place.
#[tokio::test]
async fn reconciliation_flags_and_auto_resolves_a_ghost_position() {
    let processor = processor_with_equity(dec!(10_000)).await;
    processor
        .apply_fill("BTC", PhaseId::P1, "binance", PositionSide::Long, dec!(1), dec!(100), 1.0)
        .await;

    let (event_store, _dir) = event_store();
    let (events_tx, _rx) = events::channel();
    let config = brain::config::ReconciliationConfig {
        interval_ms: 1000,
        exchanges: vec!["binance".to_string()],
        auto_resolve: true,
    };
    let service = ReconciliationService::new(
        config,
        processor.clone(),
        Arc::new(MissingExchangePosition),
        event_store,
        events_tx,
        Arc::new(SystemClock),
    );

    let report = service.run_once().await.unwrap();
    assert_eq!(report.auto_resolved, 1);
    assert_eq!(report.drifts.len(), 1);
}
