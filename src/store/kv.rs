//! Hot-reloadable key-value bucket backing the config overlay, the
//! circuit breaker single row, and the leader lease — every consumer of
//! `collaborators::Kv` shares this one SQLite-backed table with an
//! upsert-on-write, load-on-init persistence shape.

use std::sync::Arc;

use anyhow::Context;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::collaborators::Kv;
use crate::error::{BrainError, BrainResult};

#[derive(Clone)]
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("open kv db")?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait::async_trait]
impl Kv for SqliteKv {
    async fn get(&self, key: &str) -> BrainResult<Option<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare_cached("SELECT value FROM kv_store WHERE key = ?1")
            .map_err(|e| BrainError::TransientIo(e.to_string()))?;
        let mut rows = stmt
            .query(params![key])
            .map_err(|e| BrainError::TransientIo(e.to_string()))?;
        match rows.next().map_err(|e| BrainError::TransientIo(e.to_string()))? {
            Some(row) => Ok(Some(row.get(0).map_err(|e| BrainError::TransientIo(e.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> BrainResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|e| BrainError::TransientIo(e.to_string()))?;
        Ok(())
    }
}

/// A typed view over `Kv` for the hot-reloadable risk parameter bucket.
/// Reads parse as TOML fragments; `applyProposal`/`rollbackConfiguration`
/// are not modeled here — only this read path is implemented.
pub struct ConfigBucket<'a> {
    kv: &'a dyn Kv,
}

impl<'a> ConfigBucket<'a> {
    pub fn new(kv: &'a dyn Kv) -> Self {
        Self { kv }
    }

    pub async fn get_f64(&self, key: &str) -> BrainResult<Option<f64>> {
        match self.kv.get(key).await? {
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|e| BrainError::ContractViolation(format!("config key {key}: {e}"))),
            None => Ok(None),
        }
    }

    pub async fn set_f64(&self, key: &str, value: f64) -> BrainResult<()> {
        self.kv.set(key, &value.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv() -> (SqliteKv, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");
        (SqliteKv::open(path.to_str().unwrap()).unwrap(), dir)
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let (store, _dir) = kv();
        assert!(store.get("risk.maxCorrelation").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let (store, _dir) = kv();
        store.set("risk.maxCorrelation", "0.8").await.unwrap();
        assert_eq!(store.get("risk.maxCorrelation").await.unwrap().unwrap(), "0.8");
    }

    #[tokio::test]
    async fn overwrite_replaces_value() {
        let (store, _dir) = kv();
        store.set("k", "1").await.unwrap();
        store.set("k", "2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), "2");
    }

    #[tokio::test]
    async fn config_bucket_parses_floats() {
        let (store, _dir) = kv();
        let bucket = ConfigBucket::new(&store);
        bucket.set_f64("risk.maxCorrelation", 0.65).await.unwrap();
        assert_eq!(bucket.get_f64("risk.maxCorrelation").await.unwrap(), Some(0.65));
    }
}
