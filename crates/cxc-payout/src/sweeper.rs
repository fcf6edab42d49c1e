//! Periodic recovery: move `retry_wait` jobs whose deadline has passed back
//! onto the queue, and requeue anything stuck `processing` past a stall
//! threshold (a worker that died mid-claim).

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::queue::PayoutQueue;

const STALL_THRESHOLD_MINUTES: i64 = 10;

/// Re-enqueue every `retry_wait` job whose `next_attempt_at` has passed.
pub async fn sweep_retry_wait(pool: &PgPool, queue: &PayoutQueue) -> anyhow::Result<usize> {
    let due: Vec<(Uuid,)> = sqlx::query_as(
        "update payout_jobs set status = 'queued' where status = 'retry_wait' and next_attempt_at <= now() returning id",
    )
    .fetch_all(pool)
    .await?;

    for (job_id,) in &due {
        queue.push(*job_id).await?;
    }
    if !due.is_empty() {
        info!(count = due.len(), "swept retry_wait payout jobs back onto the queue");
    }
    Ok(due.len())
}

/// Re-enqueue jobs stuck `processing` for longer than the stall threshold —
/// the worker that claimed them almost certainly crashed before settling.
pub async fn sweep_stalled_processing(pool: &PgPool, queue: &PayoutQueue) -> anyhow::Result<usize> {
    let cutoff = Utc::now() - Duration::minutes(STALL_THRESHOLD_MINUTES);
    let stalled: Vec<(Uuid,)> = sqlx::query_as(
        "update payout_jobs set status = 'queued' where status = 'processing' and started_at <= $1 returning id",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    for (job_id,) in &stalled {
        queue.push(*job_id).await?;
    }
    if !stalled.is_empty() {
        info!(count = stalled.len(), "swept stalled processing payout jobs back onto the queue");
    }
    Ok(stalled.len())
}

/// Manual recovery for an operator: move a `dead` job back to `queued` and
/// push it onto the queue. Used by the `payout requeue-dead` CLI command.
pub async fn requeue_dead(pool: &PgPool, queue: &PayoutQueue, job_id: Uuid) -> anyhow::Result<bool> {
    let updated: Option<(Uuid,)> = sqlx::query_as(
        "update payout_jobs set status = 'queued', attempts = 0, next_attempt_at = null where id = $1 and status = 'dead' returning id",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(_) => {
            queue.push(job_id).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
