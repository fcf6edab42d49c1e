//! Settlement worker: claim one job, settle one bet, retry or dead-letter
//! on failure.
//!
//! Claim and settlement are two separate transactions (per the design), so
//! a crash between them leaves the job `processing` rather than silently
//! losing it — `sweeper::recover_stuck_processing` below handles that case
//! the same way it handles expired `retry_wait`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use cxc_ledger::SuperAdminCache;
use cxc_schemas::Points;

use crate::backoff::backoff_for;
use crate::queue::PayoutQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutError {
    JobNotFound { job_id: Uuid },
    JobNotQueued { job_id: Uuid },
}

impl std::fmt::Display for PayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JobNotFound { job_id } => write!(f, "payout job {job_id} not found"),
            Self::JobNotQueued { job_id } => write!(f, "payout job {job_id} is not queued"),
        }
    }
}

impl std::error::Error for PayoutError {}

struct ClaimedJob {
    bet_id: Uuid,
    result_option_id: Uuid,
    attempts: i32,
    max_attempts: i32,
}

/// First transaction: lock the job, reject unless `queued`, mark
/// `processing` and bump `attempts`. Commits immediately so other workers
/// skip this job.
async fn claim(pool: &PgPool, job_id: Uuid) -> anyhow::Result<Result<ClaimedJob, PayoutError>> {
    let mut tx = pool.begin().await?;

    let row: Option<(String, i32, i32, Uuid, Uuid)> = sqlx::query_as(
        "select status, attempts, max_attempts, bet_id, result_option_id from payout_jobs where id = $1 for update",
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((status, attempts, max_attempts, bet_id, result_option_id)) = row else {
        return Ok(Err(PayoutError::JobNotFound { job_id }));
    };
    if status != "queued" {
        return Ok(Err(PayoutError::JobNotQueued { job_id }));
    }

    let new_attempts = attempts + 1;
    sqlx::query(
        "update payout_jobs set status = 'processing', started_at = now(), attempts = $1 where id = $2",
    )
    .bind(new_attempts)
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Ok(ClaimedJob {
        bet_id,
        result_option_id,
        attempts: new_attempts,
        max_attempts,
    }))
}

#[derive(sqlx::FromRow)]
struct OpenPosition {
    id: Uuid,
    user_id: Uuid,
    bet_option_id: Uuid,
    stake_points: i64,
    odds_at_purchase_centi: i64,
}

/// Second transaction: settle every open position of `bet_id` against
/// `result_option_id`, apply all credits, mark the bet resolved, and mark
/// the job completed — all in one commit, so a crash mid-way leaves nothing
/// half-settled.
async fn settle(
    pool: &PgPool,
    super_admin: &SuperAdminCache,
    job_id: Uuid,
    bet_id: Uuid,
    result_option_id: Uuid,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("select 1 from bets where id = $1 for update")
        .bind(bet_id)
        .fetch_one(&mut *tx)
        .await?;

    let positions: Vec<OpenPosition> = sqlx::query_as(
        "select id, user_id, bet_option_id, stake_points, odds_at_purchase_centi from bet_positions where bet_id = $1 and status = 'open' for update",
    )
    .bind(bet_id)
    .fetch_all(&mut *tx)
    .await?;

    let mut total_fee = Points::ZERO;

    for position in &positions {
        let gross = if position.bet_option_id == result_option_id {
            let odds = cxc_schemas::OddsCenti::new_unchecked(position.odds_at_purchase_centi);
            odds.apply_to(Points::new(position.stake_points))
        } else {
            Points::ZERO
        };
        let fee = cxc_schemas::fee_on(gross);
        let net = Points::new((gross.raw() - fee.raw()).max(0));
        total_fee = total_fee.saturating_add(fee);

        if net.is_positive() {
            cxc_ledger::apply_delta(
                &mut tx,
                position.user_id,
                net,
                "bet_payout_credit",
                None,
                None,
                Some(bet_id.to_string()),
                serde_json::json!({ "bet_id": bet_id, "position_id": position.id, "job_id": job_id }),
            )
            .await?;
        }

        sqlx::query("update bet_positions set status = 'settled', payout_points = $1 where id = $2")
            .bind(net.raw())
            .bind(position.id)
            .execute(&mut *tx)
            .await?;
    }

    if total_fee.is_positive() {
        let super_admin_id = super_admin.get(pool).await?;
        cxc_ledger::apply_delta(
            &mut tx,
            super_admin_id,
            total_fee,
            "bet_payout_fee",
            None,
            None,
            Some(bet_id.to_string()),
            serde_json::json!({ "bet_id": bet_id, "job_id": job_id }),
        )
        .await?;
    }

    sqlx::query(
        "update bets set status = 'resolved', result_option_id = $1, resolved_at = now() where id = $2",
    )
    .bind(result_option_id)
    .bind(bet_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("update payout_jobs set status = 'completed' where id = $1")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Short recovery transaction run when `settle` fails: either schedule a
/// retry with exponential backoff, or dead-letter if attempts are
/// exhausted.
async fn record_failure(pool: &PgPool, job_id: Uuid, attempts: i32, max_attempts: i32) -> anyhow::Result<()> {
    if attempts < max_attempts {
        let next_attempt_at: DateTime<Utc> = Utc::now() + backoff_for(attempts);
        sqlx::query(
            "update payout_jobs set status = 'retry_wait', next_attempt_at = $1 where id = $2",
        )
        .bind(next_attempt_at)
        .bind(job_id)
        .execute(pool)
        .await?;
        warn!(%job_id, attempts, "payout job scheduled for retry");
    } else {
        sqlx::query("update payout_jobs set status = 'dead' where id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        error!(%job_id, attempts, "payout job dead-lettered after exhausting retries");
    }
    Ok(())
}

/// Process one job id end to end: claim, settle, and on failure schedule a
/// retry or dead-letter. Returns `Ok(())` even when the job failed and was
/// rescheduled — only an unexpected infrastructure error (DB unreachable)
/// propagates.
pub async fn process_one(pool: &PgPool, super_admin: &SuperAdminCache, job_id: Uuid) -> anyhow::Result<()> {
    let claimed = match claim(pool, job_id).await? {
        Ok(job) => job,
        Err(e) => {
            info!(%job_id, error = %e, "payout job not claimable, skipping");
            return Ok(());
        }
    };

    match settle(pool, super_admin, job_id, claimed.bet_id, claimed.result_option_id).await {
        Ok(()) => {
            info!(%job_id, bet_id = %claimed.bet_id, "payout settled");
            Ok(())
        }
        Err(e) => {
            error!(%job_id, error = %e, "payout settlement failed");
            record_failure(pool, job_id, claimed.attempts, claimed.max_attempts).await
        }
    }
}

/// Long-running loop: blocking-pop the queue and settle whatever arrives.
/// Intended to run as one of several concurrent worker tasks.
pub async fn run(pool: PgPool, super_admin: SuperAdminCache, queue: PayoutQueue) -> anyhow::Result<()> {
    loop {
        match queue.pop_blocking(5.0).await? {
            Some(job_id) => {
                if let Err(e) = process_one(&pool, &super_admin, job_id).await {
                    error!(%job_id, error = %e, "payout worker iteration failed");
                }
            }
            None => continue,
        }
    }
}
