//! `BrainContext` — the arena owner holding every engine and collaborator
//! behind `Arc`. Nothing owns another across the Brain/engines/
//! reconciliation cycle; this struct is the single place that does, and it
//! only ever hands out read-only or interior-mutable handles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::collaborators::{Clock, EventStore, Execution, Kv, PhaseNotifier, SystemClock};
use crate::config::BrainConfig;
use crate::engines::{CircuitBreaker, CircuitBreakerState, Governance, GovernanceConfig, InferenceConfig, InferenceEngine, PerformanceTracker};
use crate::leader::LeaderElection;
use crate::orchestrator::events::{self, BrainEventReceiver};
use crate::orchestrator::signal_processor::SignalProcessor;
use crate::reconciliation::service::ReconciliationService;
use crate::store::{SnapshotStore, SqliteEventStore, SqliteKv};

const BREAKER_STATE_KEY: &str = "breaker.state";
const PERFORMANCE_RING_KEY: &str = "performance.ring";

pub struct BrainContext {
    pub config: BrainConfig,
    pub processor: Arc<SignalProcessor>,
    pub event_store: Arc<SqliteEventStore>,
    pub snapshot_store: Arc<SnapshotStore>,
    pub kv: Arc<SqliteKv>,
    pub leader: Arc<LeaderElection>,
    pub reconciliation: Arc<ReconciliationService>,
    pub clock: Arc<dyn Clock>,
    recovered: AtomicBool,
}

impl BrainContext {
    pub async fn new(
        config: BrainConfig,
        execution: Arc<dyn Execution>,
        notifier: Arc<dyn PhaseNotifier>,
        instance_id: String,
    ) -> anyhow::Result<(Self, BrainEventReceiver)> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let event_store = Arc::new(SqliteEventStore::open(&config.database_path)?);
        let snapshot_store = Arc::new(SnapshotStore::open(&config.database_path)?);
        let kv = Arc::new(SqliteKv::open(&config.database_path)?);

        let (events_tx, events_rx) = events::channel();

        let breaker = match kv.get(BREAKER_STATE_KEY).await.ok().flatten() {
            Some(raw) => match serde_json::from_str::<CircuitBreakerState>(&raw) {
                Ok(state) => {
                    info!("restored circuit breaker state from kv store");
                    CircuitBreaker::restore(config.breaker.clone(), state)
                }
                Err(_) => CircuitBreaker::new(config.breaker.clone(), config.initial_equity),
            },
            None => CircuitBreaker::new(config.breaker.clone(), config.initial_equity),
        };
        let performance_raw = kv.get(PERFORMANCE_RING_KEY).await.ok().flatten();
        let performance = PerformanceTracker::restore(config.performance.clone(), performance_raw.as_deref());
        let inference = InferenceEngine::new(InferenceConfig::default());
        let governance = Governance::new(GovernanceConfig::default());

        let event_store_dyn: Arc<dyn EventStore> = event_store.clone();
        let kv_dyn: Arc<dyn Kv> = kv.clone();

        let processor = Arc::new(SignalProcessor::new(
            config.clone(),
            breaker,
            performance,
            inference,
            governance,
            clock.clone(),
            event_store_dyn,
            notifier.clone(),
            execution.clone(),
            events_tx.clone(),
            kv_dyn.clone(),
        ));

        let leader = Arc::new(LeaderElection::new(kv_dyn.clone(), instance_id, clock.clone()));
        let reconciliation = Arc::new(ReconciliationService::new(
            config.reconciliation.clone(),
            processor.clone(),
            execution,
            event_store.clone(),
            events_tx,
            clock.clone(),
        ));

        Ok((
            Self {
                config,
                processor,
                event_store,
                snapshot_store,
                kv,
                leader,
                reconciliation,
                clock,
                recovered: AtomicBool::new(false),
            },
            events_rx,
        ))
    }

    /// `true` once `recover` has completed at least once since construction
    /// or since the last promotion-triggered recovery began. The queue
    /// drain loop must consult this alongside leadership: promotion flips
    /// the leader flag before recovery runs, so leadership alone is not
    /// enough to know it is safe to process signals yet.
    pub fn is_recovered(&self) -> bool {
        self.recovered.load(Ordering::SeqCst)
    }

    /// Recovery: load the latest snapshot (or the zero-state default),
    /// restore it into the processor, then replay any event recorded after
    /// the snapshot was taken. Run on startup and again on every promotion
    /// to leader, before the queue drain loop is allowed to run.
    pub async fn recover(&self) -> anyhow::Result<()> {
        self.recovered.store(false, Ordering::SeqCst);

        let loaded = self.snapshot_store.load_latest().await?;
        let (payload, from_seq) = match loaded {
            Some(snapshot) => (snapshot.payload, Some(snapshot.caused_by_event_seq)),
            None => (Default::default(), None),
        };
        self.processor.restore_from_snapshot(&payload).await;

        let replayed = self.event_store.replay("reconciliation", from_seq).await?;
        if !replayed.is_empty() {
            info!(count = replayed.len(), "replayed events recorded since the last snapshot");
        }

        self.recovered.store(true, Ordering::SeqCst);
        Ok(())
    }
}
