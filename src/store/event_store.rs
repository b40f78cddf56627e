//! Event Store + Replay: append-only log keyed by `aggregate_id`,
//! strictly ordered by `seq` per aggregate.
//!
//! SQLite via `rusqlite` behind `Arc<tokio::sync::Mutex<Connection>>`,
//! WAL journal mode, `prepare_cached` statements, one index per hot
//! query path.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::collaborators::{EventStore, StoredEvent};
use crate::error::{BrainError, BrainResult};

#[derive(Clone)]
pub struct SqliteEventStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventStore {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("open event store db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                aggregate_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                type TEXT NOT NULL,
                payload TEXT NOT NULL,
                ts INTEGER NOT NULL,
                trace_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                PRIMARY KEY (aggregate_id, seq)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_aggregate_seq ON events(aggregate_id, seq ASC)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Truncates every aggregate's events. Only ever called from the
    /// `brain rebuild --reset` CLI path, outside the hot loop.
    pub async fn truncate_all(&self) -> BrainResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM events", [])
            .map_err(|e| BrainError::Fatal(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventStore for SqliteEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        event_type: &str,
        payload: Value,
        trace_id: &str,
    ) -> BrainResult<i64> {
        let conn = self.conn.lock().await;
        let payload_text = payload.to_string();
        let now = Utc::now().timestamp_millis();

        // Single-statement CAS: next seq is MAX(seq)+1 computed inside the
        // same INSERT, so two concurrent writers for the same aggregate
        // can't both win the same seq.
        let result = conn.execute(
            "INSERT INTO events (aggregate_id, seq, type, payload, ts, trace_id, version)
             SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2, ?3, ?4, ?5, 1
             FROM events WHERE aggregate_id = ?1",
            params![aggregate_id, event_type, payload_text, now, trace_id],
        );

        match result {
            Ok(0) => {
                // No prior rows for this aggregate: the correlated SELECT matched
                // zero rows, so seed seq=1 directly.
                conn.execute(
                    "INSERT INTO events (aggregate_id, seq, type, payload, ts, trace_id, version)
                     VALUES (?1, 1, ?2, ?3, ?4, ?5, 1)",
                    params![aggregate_id, event_type, payload_text, now, trace_id],
                )
                .map_err(|e| BrainError::TransientIo(e.to_string()))?;
                Ok(1)
            }
            Ok(_) => {
                let mut stmt = conn
                    .prepare_cached("SELECT MAX(seq) FROM events WHERE aggregate_id = ?1")
                    .map_err(|e| BrainError::TransientIo(e.to_string()))?;
                let seq: i64 = stmt
                    .query_row(params![aggregate_id], |row| row.get(0))
                    .map_err(|e| BrainError::TransientIo(e.to_string()))?;
                Ok(seq)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(BrainError::StateConflict(format!(
                    "concurrent append race on aggregate {aggregate_id}"
                )))
            }
            Err(e) => Err(BrainError::TransientIo(e.to_string())),
        }
    }

    async fn replay(&self, aggregate_id: &str, from_seq: Option<i64>) -> BrainResult<Vec<StoredEvent>> {
        let conn = self.conn.lock().await;
        let from_seq = from_seq.unwrap_or(0);
        let mut stmt = conn
            .prepare_cached(
                "SELECT aggregate_id, seq, type, payload, ts, trace_id, version
                 FROM events WHERE aggregate_id = ?1 AND seq > ?2 ORDER BY seq ASC",
            )
            .map_err(|e| BrainError::TransientIo(e.to_string()))?;

        let rows = stmt
            .query_map(params![aggregate_id, from_seq], |row| {
                let ts_millis: i64 = row.get(4)?;
                let payload_text: String = row.get(3)?;
                Ok(StoredEvent {
                    aggregate_id: row.get(0)?,
                    seq: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: serde_json::from_str(&payload_text).unwrap_or(Value::Null),
                    ts: Utc.timestamp_millis_opt(ts_millis).single().unwrap_or_else(Utc::now),
                    trace_id: row.get(5)?,
                    version: row.get(6)?,
                })
            })
            .map_err(|e| BrainError::TransientIo(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| BrainError::TransientIo(e.to_string()))?);
        }
        Ok(out)
    }

    async fn max_seq(&self, aggregate_id: &str) -> BrainResult<i64> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached("SELECT COALESCE(MAX(seq), 0) FROM events WHERE aggregate_id = ?1")
            .map_err(|e| BrainError::TransientIo(e.to_string()))?;
        let seq: i64 = stmt
            .query_row(params![aggregate_id], |row| row.get(0))
            .map_err(|e| BrainError::TransientIo(e.to_string()))?;
        Ok(seq)
    }
}

/// Helper retained for callers that only have a `DateTime<Utc>` and need
/// the millis representation the schema stores.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (SqliteEventStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let store = SqliteEventStore::open(path.to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn appends_increment_seq_per_aggregate() {
        let (store, _dir) = store();
        let s1 = store.append("agg-1", "Opened", json!({"x": 1}), "trace-1").await.unwrap();
        let s2 = store.append("agg-1", "Updated", json!({"x": 2}), "trace-2").await.unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[tokio::test]
    async fn seq_is_independent_per_aggregate() {
        let (store, _dir) = store();
        store.append("agg-a", "E", json!({}), "t").await.unwrap();
        let first_b = store.append("agg-b", "E", json!({}), "t").await.unwrap();
        assert_eq!(first_b, 1);
    }

    #[tokio::test]
    async fn replay_streams_in_order_from_seq() {
        let (store, _dir) = store();
        store.append("agg-1", "A", json!({"n": 1}), "t").await.unwrap();
        store.append("agg-1", "B", json!({"n": 2}), "t").await.unwrap();
        store.append("agg-1", "C", json!({"n": 3}), "t").await.unwrap();

        let all = store.replay("agg-1", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].event_type, "A");

        let tail = store.replay("agg-1", Some(1)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].event_type, "B");
    }

    #[tokio::test]
    async fn truncate_all_clears_every_aggregate() {
        let (store, _dir) = store();
        store.append("agg-1", "A", json!({}), "t").await.unwrap();
        store.truncate_all().await.unwrap();
        let seq = store.max_seq("agg-1").await.unwrap();
        assert_eq!(seq, 0);
    }
}
