//! Durable FIFO queue of payout job ids, backed by a Redis list.
//!
//! The Postgres `payout_jobs` row is the source of truth for job state; the
//! queue only carries "a worker should look at this job id soon" — losing a
//! queue entry is recoverable (the sweeper re-enqueues anything stuck in
//! `retry_wait` past its deadline), but a phantom entry for an already
//! `completed` job is harmless since `claim` rejects anything not `queued`.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

#[derive(Clone)]
pub struct PayoutQueue {
    conn: ConnectionManager,
    key: String,
}

impl PayoutQueue {
    pub async fn connect(redis_url: &str, key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("connect redis connection manager")?;
        Ok(Self { conn, key: key.into() })
    }

    pub async fn push(&self, job_id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(&self.key, job_id.to_string())
            .await
            .context("lpush payout job")?;
        Ok(())
    }

    /// Block for up to `timeout_secs` waiting for a job id; `None` means the
    /// call timed out with nothing available (not an error — callers loop).
    pub async fn pop_blocking(&self, timeout_secs: f64) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, String)> = conn
            .brpop(&self.key, timeout_secs)
            .await
            .context("brpop payout queue")?;
        match reply {
            Some((_, raw_id)) => {
                let id = Uuid::parse_str(&raw_id).context("payout queue entry is not a uuid")?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }
}
