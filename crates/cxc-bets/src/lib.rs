//! Bet engine: create/options, buy, sell, cancel, resolve.
//!
//! Every lock order is bet row first, then position row(s), matching the
//! ordering rule in the concurrency model so buy/sell/cancel/resolve never
//! deadlock against each other on the same bet.

pub mod state_machine;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use cxc_ledger::SuperAdminCache;
use cxc_schemas::{fee_on, OddsCenti, Points};
use state_machine::{BetEvent, BetState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BetError {
    NotFound { bet_id: Uuid },
    OptionNotFound { option_id: Uuid },
    PositionNotFound { position_id: Uuid },
    BuyClosed { bet_id: Uuid },
    SellForbidden { bet_id: Uuid },
    PositionNotOpen { position_id: Uuid },
    InsufficientPoints { user_id: Uuid },
    GroupAccessDenied { bet_id: Uuid },
    Transition(state_machine::TransitionError),
    AlreadyResolved { bet_id: Uuid },
    TooFewOptions,
}

impl From<state_machine::TransitionError> for BetError {
    fn from(e: state_machine::TransitionError) -> Self {
        BetError::Transition(e)
    }
}

impl std::fmt::Display for BetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { bet_id } => write!(f, "bet {bet_id} not found"),
            Self::OptionNotFound { option_id } => write!(f, "bet option {option_id} not found"),
            Self::PositionNotFound { position_id } => {
                write!(f, "bet position {position_id} not found")
            }
            Self::BuyClosed { bet_id } => write!(f, "bet {bet_id} is not open for buying"),
            Self::SellForbidden { bet_id } => write!(f, "bet {bet_id} does not allow selling now"),
            Self::PositionNotOpen { position_id } => {
                write!(f, "position {position_id} is not open")
            }
            Self::InsufficientPoints { user_id } => {
                write!(f, "user {user_id} has insufficient points")
            }
            Self::GroupAccessDenied { bet_id } => {
                write!(f, "bet {bet_id} is not visible to this user's groups")
            }
            Self::Transition(e) => write!(f, "{e}"),
            Self::AlreadyResolved { bet_id } => write!(f, "bet {bet_id} is already resolved"),
            Self::TooFewOptions => write!(f, "a bet needs at least two options"),
        }
    }
}

impl std::error::Error for BetError {}

pub struct NewBet {
    pub creator_user_id: Uuid,
    pub group_id: Option<Uuid>,
    pub title: String,
    pub bet_type: &'static str,
    pub closes_at: DateTime<Utc>,
    pub options: Vec<(String, Option<f64>, OddsCenti)>,
}

pub async fn create_bet(pool: &PgPool, bet: NewBet) -> anyhow::Result<Result<Uuid, BetError>> {
    if bet.options.len() < 2 {
        return Ok(Err(BetError::TooFewOptions));
    }

    let mut tx = pool.begin().await?;
    let (bet_id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into bets (creator_user_id, group_id, title, bet_type, closes_at, status)
        values ($1, $2, $3, $4, $5, 'open')
        returning id
        "#,
    )
    .bind(bet.creator_user_id)
    .bind(bet.group_id)
    .bind(bet.title)
    .bind(bet.bet_type)
    .bind(bet.closes_at)
    .fetch_one(&mut *tx)
    .await?;

    for (label, numeric_value, odds) in &bet.options {
        sqlx::query(
            "insert into bet_options (bet_id, label, numeric_value, current_odds_centi) values ($1, $2, $3, $4)",
        )
        .bind(bet_id)
        .bind(label)
        .bind(numeric_value)
        .bind(odds.raw_centi())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(Ok(bet_id))
}

#[derive(sqlx::FromRow)]
struct BetRow {
    status: String,
    closes_at: DateTime<Utc>,
    group_id: Option<Uuid>,
}

async fn lock_bet(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    bet_id: Uuid,
) -> anyhow::Result<Option<BetRow>> {
    let row: Option<BetRow> =
        sqlx::query_as("select status, closes_at, group_id from bets where id = $1 for update")
            .bind(bet_id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(row)
}

pub struct BuyOutcome {
    pub position_id: Uuid,
    pub odds_at_purchase: OddsCenti,
}

/// Buy into `option_id` of `bet_id` for `stake` points.
pub async fn buy(
    pool: &PgPool,
    bet_id: Uuid,
    option_id: Uuid,
    user_id: Uuid,
    stake: Points,
) -> anyhow::Result<Result<BuyOutcome, BetError>> {
    let mut tx = pool.begin().await?;

    let Some(bet) = lock_bet(&mut tx, bet_id).await? else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    let Some(state) = BetState::from_db_str(&bet.status) else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    if !state.buy_allowed() || bet.closes_at <= Utc::now() {
        return Ok(Err(BetError::BuyClosed { bet_id }));
    }
    if !cxc_access::group_visible(pool, user_id, bet.group_id).await? {
        return Ok(Err(BetError::GroupAccessDenied { bet_id }));
    }

    let option_odds: Option<(i64,)> =
        sqlx::query_as("select current_odds_centi from bet_options where id = $1 and bet_id = $2 for update")
            .bind(option_id)
            .bind(bet_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((odds_centi,)) = option_odds else {
        return Ok(Err(BetError::OptionNotFound { option_id }));
    };
    let odds = OddsCenti::new_unchecked(odds_centi);

    let debit = cxc_ledger::apply_delta(
        &mut tx,
        user_id,
        Points::new(-stake.raw()),
        "bet_buy_debit",
        Some(user_id),
        None,
        Some(bet_id.to_string()),
        serde_json::json!({ "bet_id": bet_id, "option_id": option_id }),
    )
    .await;
    if debit.is_err() {
        return Ok(Err(BetError::InsufficientPoints { user_id }));
    }

    let (position_id,): (Uuid,) = sqlx::query_as(
        r#"
        insert into bet_positions (bet_id, bet_option_id, user_id, stake_points, odds_at_purchase_centi, status)
        values ($1, $2, $3, $4, $5, 'open')
        returning id
        "#,
    )
    .bind(bet_id)
    .bind(option_id)
    .bind(user_id)
    .bind(stake.raw())
    .bind(odds.raw_centi())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Ok(BuyOutcome { position_id, odds_at_purchase: odds }))
}

pub struct SellOutcome {
    pub net: Points,
    pub fee: Points,
}

/// Cash out an open position early, at the option's current odds.
pub async fn sell(
    pool: &PgPool,
    super_admin: &SuperAdminCache,
    bet_id: Uuid,
    position_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Result<SellOutcome, BetError>> {
    let mut tx = pool.begin().await?;

    let Some(bet) = lock_bet(&mut tx, bet_id).await? else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    let Some(state) = BetState::from_db_str(&bet.status) else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    if !state.sell_allowed() {
        return Ok(Err(BetError::SellForbidden { bet_id }));
    }

    #[derive(sqlx::FromRow)]
    struct PositionRow {
        bet_option_id: Uuid,
        stake_points: i64,
        odds_at_purchase_centi: i64,
        status: String,
    }

    let position: Option<PositionRow> = sqlx::query_as(
        "select bet_option_id, stake_points, odds_at_purchase_centi, status from bet_positions where id = $1 and bet_id = $2 for update",
    )
    .bind(position_id)
    .bind(bet_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(position) = position else {
        return Ok(Err(BetError::PositionNotFound { position_id }));
    };
    if position.status != "open" {
        return Ok(Err(BetError::PositionNotOpen { position_id }));
    }

    let (current_odds_centi,): (i64,) =
        sqlx::query_as("select current_odds_centi from bet_options where id = $1 for update")
            .bind(position.bet_option_id)
            .fetch_one(&mut *tx)
            .await?;

    let stake = Points::new(position.stake_points);
    let purchase_odds = OddsCenti::new_unchecked(position.odds_at_purchase_centi);
    let current_odds = OddsCenti::new_unchecked(current_odds_centi);

    let cashout = OddsCenti::ratio_apply(stake, current_odds, purchase_odds);
    let fee = fee_on(cashout);
    let net = Points::new((cashout.raw() - fee.raw()).max(0));

    cxc_ledger::apply_delta(
        &mut tx,
        user_id,
        net,
        "bet_sell_credit",
        Some(user_id),
        None,
        Some(bet_id.to_string()),
        serde_json::json!({ "bet_id": bet_id, "position_id": position_id }),
    )
    .await?;

    if fee.is_positive() {
        let super_admin_id = super_admin.get(pool).await?;
        cxc_ledger::apply_delta(
            &mut tx,
            super_admin_id,
            fee,
            "bet_sell_fee",
            Some(user_id),
            None,
            Some(bet_id.to_string()),
            serde_json::json!({ "bet_id": bet_id, "position_id": position_id }),
        )
        .await?;
    }

    sqlx::query("update bet_positions set status = 'sold', sold_points = $1 where id = $2")
        .bind(net.raw())
        .bind(position_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Ok(SellOutcome { net, fee }))
}

/// Cancel a bet: refund every open position at its original stake and mark
/// the bet cancelled. Admin-only at the route layer.
pub async fn cancel(pool: &PgPool, bet_id: Uuid) -> anyhow::Result<Result<(), BetError>> {
    let mut tx = pool.begin().await?;

    let Some(bet) = lock_bet(&mut tx, bet_id).await? else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    let Some(state) = BetState::from_db_str(&bet.status) else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    if let Err(e) = state.apply(BetEvent::Cancel) {
        return Ok(Err(e.into()));
    }

    #[derive(sqlx::FromRow)]
    struct OpenPosition {
        id: Uuid,
        user_id: Uuid,
        stake_points: i64,
    }

    let positions: Vec<OpenPosition> = sqlx::query_as(
        "select id, user_id, stake_points from bet_positions where bet_id = $1 and status = 'open' for update",
    )
    .bind(bet_id)
    .fetch_all(&mut *tx)
    .await?;

    for position in &positions {
        cxc_ledger::apply_delta(
            &mut tx,
            position.user_id,
            Points::new(position.stake_points),
            "bet_cancel_refund",
            None,
            Some("bet cancelled by admin".to_string()),
            Some(bet_id.to_string()),
            serde_json::json!({ "bet_id": bet_id, "position_id": position.id }),
        )
        .await?;

        sqlx::query("update bet_positions set status = 'cancelled', payout_points = $1 where id = $2")
            .bind(position.stake_points)
            .bind(position.id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("update bets set status = 'cancelled' where id = $1")
        .bind(bet_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Ok(()))
}

/// Resolve a bet: validate the result option, move it into `resolving`, and
/// enqueue (or revive) its `PayoutJob`. Settlement itself is done by
/// `cxc-payout`, off this request.
pub async fn resolve(
    pool: &PgPool,
    bet_id: Uuid,
    result_option_id: Uuid,
    resolved_by: Uuid,
    max_attempts: i32,
) -> anyhow::Result<Result<Uuid, BetError>> {
    let mut tx = pool.begin().await?;

    let Some(bet) = lock_bet(&mut tx, bet_id).await? else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    let Some(state) = BetState::from_db_str(&bet.status) else {
        return Ok(Err(BetError::NotFound { bet_id }));
    };
    if state == BetState::Resolved {
        return Ok(Err(BetError::AlreadyResolved { bet_id }));
    }
    if let Err(e) = state.apply(BetEvent::Resolve) {
        return Ok(Err(e.into()));
    }

    let option_exists: (bool,) = sqlx::query_as(
        "select exists(select 1 from bet_options where id = $1 and bet_id = $2)",
    )
    .bind(result_option_id)
    .bind(bet_id)
    .fetch_one(&mut *tx)
    .await?;
    if !option_exists.0 {
        return Ok(Err(BetError::OptionNotFound { option_id: result_option_id }));
    }

    let existing_job: Option<(Uuid, String)> =
        sqlx::query_as("select id, status from payout_jobs where bet_id = $1 for update")
            .bind(bet_id)
            .fetch_optional(&mut *tx)
            .await?;

    let job_id = match existing_job {
        Some((job_id, status)) if status == "completed" => {
            return Ok(Err(BetError::AlreadyResolved { bet_id }));
        }
        Some((job_id, _)) => {
            sqlx::query(
                "update payout_jobs set status = 'queued', attempts = 0, next_attempt_at = null, result_option_id = $1, resolved_by = $2 where id = $3",
            )
            .bind(result_option_id)
            .bind(resolved_by)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;
            job_id
        }
        None => {
            let (job_id,): (Uuid,) = sqlx::query_as(
                r#"
                insert into payout_jobs (bet_id, result_option_id, resolved_by, max_attempts, status)
                values ($1, $2, $3, $4, 'queued')
                returning id
                "#,
            )
            .bind(bet_id)
            .bind(result_option_id)
            .bind(resolved_by)
            .bind(max_attempts)
            .fetch_one(&mut *tx)
            .await?;
            job_id
        }
    };

    sqlx::query("update bets set status = 'resolving' where id = $1")
        .bind(bet_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Ok(job_id))
}
