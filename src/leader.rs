//! Leader Election & Control: a lease-based single-writer guarantee.
//!
//! Uses the same injectable `Kv` collaborator as the event store and
//! snapshot store: the lease is just another row, renewed on an interval
//! task the same shape as the capital-flow sweep scheduler.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::collaborators::{Clock, Kv};

#[derive(Debug, Clone)]
struct Lease {
    holder: String,
    expires_at: DateTime<Utc>,
}

fn lease_key() -> &'static str {
    "leader_lease"
}

fn encode(lease: &Lease) -> String {
    format!("{}|{}", lease.holder, lease.expires_at.to_rfc3339())
}

fn decode(raw: &str) -> Option<Lease> {
    let (holder, ts) = raw.split_once('|')?;
    let expires_at = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    Some(Lease {
        holder: holder.to_string(),
        expires_at,
    })
}

/// Tracks whether this instance currently holds the writer lease.
pub struct LeaderElection {
    kv: Arc<dyn Kv>,
    instance_id: String,
    clock: Arc<dyn Clock>,
    is_leader: RwLock<bool>,
    lease_duration: Duration,
}

impl LeaderElection {
    pub fn new(kv: Arc<dyn Kv>, instance_id: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            instance_id,
            clock,
            is_leader: RwLock::new(false),
            lease_duration: Duration::seconds(30),
        }
    }

    pub fn is_leader(&self) -> bool {
        *self.is_leader.read()
    }

    /// Attempts to acquire or renew the lease. Returns `true` the moment
    /// this instance transitions into leadership (callers should run
    /// recovery then start the processor on that edge).
    pub async fn try_acquire(&self) -> anyhow::Result<bool> {
        let now = self.clock.now();
        let current = match self.kv.get(lease_key()).await {
            Ok(Some(raw)) => decode(&raw),
            Ok(None) => None,
            Err(_) => None,
        };

        let can_take = match &current {
            Some(lease) => lease.holder == self.instance_id || lease.expires_at <= now,
            None => true,
        };

        if !can_take {
            let was_leader = *self.is_leader.read();
            if was_leader {
                *self.is_leader.write() = false;
            }
            return Ok(false);
        }

        let new_lease = Lease {
            holder: self.instance_id.clone(),
            expires_at: now + self.lease_duration,
        };
        self.kv.set(lease_key(), &encode(&new_lease)).await?;

        let was_leader = *self.is_leader.read();
        *self.is_leader.write() = true;
        Ok(!was_leader)
    }

    /// Demotes this instance immediately, e.g. on cooperative shutdown.
    pub async fn release(&self) {
        *self.is_leader.write() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::SystemClock;
    use crate::store::SqliteKv;

    fn kv() -> (Arc<SqliteKv>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leader.db");
        (Arc::new(SqliteKv::open(path.to_str().unwrap()).unwrap()), dir)
    }

    #[tokio::test]
    async fn first_acquire_becomes_leader() {
        let (kv, _dir) = kv();
        let election = LeaderElection::new(kv, "node-1".to_string(), Arc::new(SystemClock));
        let became_leader = election.try_acquire().await.unwrap();
        assert!(became_leader);
        assert!(election.is_leader());
    }

    #[tokio::test]
    async fn a_held_lease_blocks_a_second_instance() {
        let (kv, _dir) = kv();
        let node1 = LeaderElection::new(kv.clone(), "node-1".to_string(), Arc::new(SystemClock));
        node1.try_acquire().await.unwrap();

        let node2 = LeaderElection::new(kv, "node-2".to_string(), Arc::new(SystemClock));
        let became_leader = node2.try_acquire().await.unwrap();
        assert!(!became_leader);
        assert!(!node2.is_leader());
    }

    #[tokio::test]
    async fn release_demotes_immediately() {
        let (kv, _dir) = kv();
        let election = LeaderElection::new(kv, "node-1".to_string(), Arc::new(SystemClock));
        election.try_acquire().await.unwrap();
        election.release().await;
        assert!(!election.is_leader());
    }
}
