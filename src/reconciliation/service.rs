//! Reconciliation Service: periodic Brain-vs-Exchange and Brain-vs-internal-
//! state comparison. Classifies drift, auto-resolves the one class safe to
//! auto-resolve (`GHOST_POSITION`), and always resolves through the normal
//! signal-processing pipeline rather than mutating `PositionManager` directly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::collaborators::{Clock, EventStore, Execution, ExecutionPosition};
use crate::config::ReconciliationConfig;
use crate::domain::position::PositionSide;
use crate::domain::{IntentSignal, PhaseId, PositionMode, Side, SignalType};
use crate::orchestrator::events::{BrainEvent, BrainEventSender};
use crate::orchestrator::signal_processor::SignalProcessor;
use crate::reconciliation::confidence::TruthConfidence;
use crate::store::SqliteEventStore;

const SIZE_EPSILON: Decimal = Decimal::new(1, 4); // 1e-4

/// Flatten, don't extend: a LONG ghost closes with a SELL, a SHORT ghost
/// closes with a BUY.
fn closing_side(position_side: PositionSide) -> Side {
    match position_side {
        PositionSide::Long => Side::Sell,
        PositionSide::Short => Side::Buy,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftKind {
    GhostPosition,
    UntrackedPosition,
    SizeMismatch,
    BrainStateLoss,
}

impl DriftKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftKind::GhostPosition => "GHOST_POSITION",
            DriftKind::UntrackedPosition => "UNTRACKED_POSITION",
            DriftKind::SizeMismatch => "SIZE_MISMATCH",
            DriftKind::BrainStateLoss => "BRAIN_STATE_LOSS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Drift {
    pub venue: String,
    pub symbol: String,
    pub side: PositionSide,
    pub kind: DriftKind,
    pub brain_size: Decimal,
    pub exchange_size: Decimal,
}

#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub at: DateTime<Utc>,
    pub drifts: Vec<Drift>,
    pub auto_resolved: usize,
}

struct VenueState {
    last_position_count: usize,
}

pub struct ReconciliationService {
    config: ReconciliationConfig,
    processor: Arc<SignalProcessor>,
    execution: Arc<dyn Execution>,
    event_store: Arc<SqliteEventStore>,
    events_tx: BrainEventSender,
    clock: Arc<dyn Clock>,
    confidence: Mutex<HashMap<String, TruthConfidence>>,
    venue_state: Mutex<HashMap<String, VenueState>>,
}

impl ReconciliationService {
    pub fn new(
        config: ReconciliationConfig,
        processor: Arc<SignalProcessor>,
        execution: Arc<dyn Execution>,
        event_store: Arc<SqliteEventStore>,
        events_tx: BrainEventSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            processor,
            execution,
            event_store,
            events_tx,
            clock,
            confidence: Mutex::new(HashMap::new()),
            venue_state: Mutex::new(HashMap::new()),
        }
    }

    pub async fn confidence_for(&self, venue: &str) -> TruthConfidence {
        let mut guard = self.confidence.lock().await;
        guard
            .entry(venue.to_string())
            .or_insert_with(|| TruthConfidence::new(venue.to_string()))
            .clone()
    }

    /// Runs one full sweep across every configured venue.
    pub async fn run_once(&self) -> anyhow::Result<ReconciliationReport> {
        let run_id = Uuid::new_v4().to_string();
        let at = self.clock.now();
        let mut drifts = Vec::new();
        let mut auto_resolved = 0;

        let brain_positions = self.processor.positions_snapshot().await;

        for venue in &self.config.exchanges {
            let exchange_positions = self.execution.fetch_exchange_positions(venue).await.unwrap_or_default();
            let exchange_by_key: HashMap<(String, PositionSide), Decimal> = exchange_positions
                .iter()
                .map(|p| ((p.symbol.clone(), p.side), p.size))
                .collect();

            let brain_by_key: HashMap<(String, PositionSide), Decimal> = brain_positions
                .all()
                .filter(|p| &p.exchange == venue)
                .map(|p| ((p.symbol.clone(), p.side), p.size))
                .collect();

            let venue_drifts = self
                .diff_positions(venue, &brain_by_key, &exchange_by_key)
                .await;

            for drift in &venue_drifts {
                let _ = self
                    .events_tx
                    .send(BrainEvent::ReconciliationDrift {
                        scope: drift.venue.clone(),
                        kind: drift.kind.as_str().to_string(),
                    })
                    .await;

                if drift.kind == DriftKind::GhostPosition && self.config.auto_resolve {
                    self.auto_resolve_ghost(drift).await;
                    auto_resolved += 1;
                }
            }

            let mut conf = self.confidence.lock().await;
            let entry = conf.entry(venue.clone()).or_insert_with(|| TruthConfidence::new(venue.clone()));
            if venue_drifts.is_empty() {
                entry.on_clean_match();
            } else {
                entry.on_mismatch(format!("{} drift(s) on {venue}", venue_drifts.len()));
            }

            drifts.extend(venue_drifts);
        }

        if let Some(state_loss) = self.detect_brain_state_loss(brain_positions.len()).await {
            let _ = self
                .events_tx
                .send(BrainEvent::ReconciliationDrift {
                    scope: "internal".to_string(),
                    kind: DriftKind::BrainStateLoss.as_str().to_string(),
                })
                .await;
            drifts.push(state_loss);
        }

        let payload = json!({
            "run_id": run_id,
            "drift_count": drifts.len(),
            "auto_resolved": auto_resolved,
            "kinds": drifts.iter().map(|d| d.kind.as_str()).collect::<Vec<_>>(),
        });
        let _ = self.event_store.append("reconciliation", "ReconciliationRunCompleted", payload, &run_id).await;

        Ok(ReconciliationReport {
            run_id,
            at,
            drifts,
            auto_resolved,
        })
    }

    async fn diff_positions(
        &self,
        venue: &str,
        brain: &HashMap<(String, PositionSide), Decimal>,
        exchange: &HashMap<(String, PositionSide), Decimal>,
    ) -> Vec<Drift> {
        let mut out = Vec::new();

        for (key, brain_size) in brain {
            match exchange.get(key) {
                None => out.push(Drift {
                    venue: venue.to_string(),
                    symbol: key.0.clone(),
                    side: key.1,
                    kind: DriftKind::GhostPosition,
                    brain_size: *brain_size,
                    exchange_size: Decimal::ZERO,
                }),
                Some(exchange_size) if (*exchange_size - *brain_size).abs() > SIZE_EPSILON => {
                    out.push(Drift {
                        venue: venue.to_string(),
                        symbol: key.0.clone(),
                        side: key.1,
                        kind: DriftKind::SizeMismatch,
                        brain_size: *brain_size,
                        exchange_size: *exchange_size,
                    })
                }
                Some(_) => {}
            }
        }

        for (key, exchange_size) in exchange {
            if !brain.contains_key(key) {
                out.push(Drift {
                    venue: venue.to_string(),
                    symbol: key.0.clone(),
                    side: key.1,
                    kind: DriftKind::UntrackedPosition,
                    brain_size: Decimal::ZERO,
                    exchange_size: *exchange_size,
                });
            }
        }

        out
    }

    /// A `GHOST_POSITION` is the Brain believing a position exists that the
    /// venue has no record of. Never patched in place: a closing signal is
    /// enqueued through the normal gate chain so the close is authorized,
    /// audited, and event-logged like any other decision.
    async fn auto_resolve_ghost(&self, drift: &Drift) {
        let side = closing_side(drift.side);
        let signal = IntentSignal {
            signal_id: format!("reconcile-{}", Uuid::new_v4()),
            phase_id: PhaseId::P1,
            symbol: drift.symbol.clone(),
            side,
            requested_size: drift.brain_size.abs().max(SIZE_EPSILON),
            timestamp: self.clock.now(),
            exchange: drift.venue.clone(),
            signal_type: SignalType::Reconciliation,
            position_mode: PositionMode::OneWay,
            stop_price: None,
            entry_price: None,
        };
        self.processor.enqueue(signal).await;
    }

    async fn detect_brain_state_loss(&self, current_count: usize) -> Option<Drift> {
        let mut guard = self.venue_state.lock().await;
        let state = guard.entry("internal".to_string()).or_insert(VenueState { last_position_count: current_count });
        let previous = state.last_position_count;
        state.last_position_count = current_count;

        if previous > 0 && current_count == 0 {
            Some(Drift {
                venue: "internal".to_string(),
                symbol: String::new(),
                side: PositionSide::Long,
                kind: DriftKind::BrainStateLoss,
                brain_size: Decimal::ZERO,
                exchange_size: Decimal::ZERO,
            })
        } else {
            None
        }
    }
}
