//! Snapshot / State Recovery: periodic and on-promotion persistence
//! of the full recoverable state, keyed and ordered by insertion time
//! like a NAV snapshot table.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{AllocationVector, PositionManager};
use crate::engines::CircuitBreakerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub allocation: AllocationVector,
    pub high_watermark: Decimal,
    pub positions: PositionManager,
    pub circuit_breaker_state: CircuitBreakerState,
}

impl Default for SnapshotPayload {
    fn default() -> Self {
        Self {
            allocation: AllocationVector::single_phase1(),
            high_watermark: Decimal::ZERO,
            positions: PositionManager::new(),
            circuit_breaker_state: CircuitBreakerState::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub payload: SnapshotPayload,
    pub caused_by_event_seq: i64,
}

#[derive(Clone)]
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SnapshotStore {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("open snapshot db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS position_snapshots (
                snapshot_id TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                payload TEXT NOT NULL,
                caused_by_event_seq INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_position_snapshots_ts ON position_snapshots(ts ASC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Writes are coalesced by the caller (at most one snapshot write in
    /// flight); this call always appends a new versioned row.
    pub async fn write(&self, payload: &SnapshotPayload, caused_by_event_seq: i64) -> anyhow::Result<String> {
        let conn = self.conn.lock().await;
        let id = Uuid::new_v4().to_string();
        let payload_text = serde_json::to_string(payload)?;
        let ts = Utc::now().timestamp_millis();

        conn.execute(
            "INSERT OR REPLACE INTO position_snapshots (snapshot_id, ts, payload, caused_by_event_seq)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, ts, payload_text, caused_by_event_seq],
        )?;
        Ok(id)
    }

    /// Loads the most recent snapshot. Returns `None` on an empty store, in
    /// which case callers fall back to `SnapshotPayload::default()` and
    /// replay the event log from seq 0.
    pub async fn load_latest(&self) -> anyhow::Result<Option<LoadedSnapshot>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT payload, caused_by_event_seq FROM position_snapshots ORDER BY ts DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let payload_text: String = row.get(0)?;
        let caused_by_event_seq: i64 = row.get(1)?;
        let payload: SnapshotPayload = serde_json::from_str(&payload_text)?;
        Ok(Some(LoadedSnapshot {
            payload,
            caused_by_event_seq,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store() -> (SnapshotStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        (SnapshotStore::open(path.to_str().unwrap()).unwrap(), dir)
    }

    #[tokio::test]
    async fn empty_store_returns_none() {
        let (store, _dir) = store();
        assert!(store.load_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn round_trips_the_latest_snapshot() {
        let (store, _dir) = store();
        let mut payload = SnapshotPayload::default();
        payload.high_watermark = dec!(5000);
        store.write(&payload, 10).await.unwrap();

        let loaded = store.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.caused_by_event_seq, 10);
        assert_eq!(loaded.payload.high_watermark, dec!(5000));
    }

    #[tokio::test]
    async fn later_write_wins_as_latest() {
        let (store, _dir) = store();
        store.write(&SnapshotPayload::default(), 1).await.unwrap();
        let mut second = SnapshotPayload::default();
        second.high_watermark = dec!(100);
        store.write(&second, 2).await.unwrap();

        let loaded = store.load_latest().await.unwrap().unwrap();
        assert_eq!(loaded.caused_by_event_seq, 2);
    }
}
