use chrono::{Duration, Utc};
use cxc_ledger::SuperAdminCache;
use uuid::Uuid;

async fn seed_user(pool: &sqlx::PgPool, email: &str, points: i64) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        "insert into users (email, password_hash, points) values ($1, $2, $3) returning id",
    )
    .bind(email)
    .bind("x")
    .bind(points)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// DB-backed test, skipped if CXC_DATABASE_URL is not set.
#[tokio::test]
async fn process_one_pays_winners_and_zeroes_losers() -> anyhow::Result<()> {
    let url = match std::env::var(cxc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: CXC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await?;
    cxc_db::schema::bootstrap(&pool).await?;

    let creator = seed_user(&pool, "scenario-payout-creator@example.test", 0).await?;
    let winner = seed_user(&pool, "scenario-payout-winner@example.test", 0).await?;
    let loser = seed_user(&pool, "scenario-payout-loser@example.test", 0).await?;
    let super_admin = seed_user(&pool, "scenario-payout-super-admin@example.test", 0).await?;
    sqlx::query(
        "insert into user_roles (user_id, role_id) select $1, id from roles where name = 'super_admin'",
    )
    .bind(super_admin)
    .execute(&pool)
    .await?;

    let (bet_id,): (Uuid,) = sqlx::query_as(
        "insert into bets (creator_user_id, title, bet_type, closes_at, status) values ($1, 'x', 'boolean', $2, 'resolving') returning id",
    )
    .bind(creator)
    .bind(Utc::now() - Duration::hours(1))
    .fetch_one(&pool)
    .await?;

    let (winning_option,): (Uuid,) = sqlx::query_as(
        "insert into bet_options (bet_id, label, current_odds_centi) values ($1, 'yes', 200) returning id",
    )
    .bind(bet_id)
    .fetch_one(&pool)
    .await?;
    let (losing_option,): (Uuid,) = sqlx::query_as(
        "insert into bet_options (bet_id, label, current_odds_centi) values ($1, 'no', 200) returning id",
    )
    .bind(bet_id)
    .fetch_one(&pool)
    .await?;

    sqlx::query(
        "insert into bet_positions (bet_id, bet_option_id, user_id, stake_points, odds_at_purchase_centi, status) values ($1, $2, $3, 100, 200, 'open')",
    )
    .bind(bet_id)
    .bind(winning_option)
    .bind(winner)
    .execute(&pool)
    .await?;
    sqlx::query(
        "insert into bet_positions (bet_id, bet_option_id, user_id, stake_points, odds_at_purchase_centi, status) values ($1, $2, $3, 50, 200, 'open')",
    )
    .bind(bet_id)
    .bind(losing_option)
    .bind(loser)
    .execute(&pool)
    .await?;

    let (job_id,): (Uuid,) = sqlx::query_as(
        "insert into payout_jobs (bet_id, result_option_id, resolved_by, max_attempts, status) values ($1, $2, $3, 8, 'queued') returning id",
    )
    .bind(bet_id)
    .bind(winning_option)
    .bind(creator)
    .fetch_one(&pool)
    .await?;

    let super_admin_cache = SuperAdminCache::new();
    cxc_payout::process_one(&pool, &super_admin_cache, job_id).await?;

    // stake 100 * odds 2.00 = 200 gross, fee = floor(200*0.02) = 4, net = 196.
    let (winner_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(winner)
        .fetch_one(&pool)
        .await?;
    assert_eq!(winner_points, 196);

    let (loser_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(loser)
        .fetch_one(&pool)
        .await?;
    assert_eq!(loser_points, 0, "losing position pays nothing");

    let (super_admin_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(super_admin)
        .fetch_one(&pool)
        .await?;
    assert_eq!(super_admin_points, 4);

    let (job_status,): (String,) = sqlx::query_as("select status from payout_jobs where id = $1")
        .bind(job_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(job_status, "completed");

    let (bet_status,): (String,) = sqlx::query_as("select status from bets where id = $1")
        .bind(bet_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(bet_status, "resolved");

    sqlx::query("delete from users where id in ($1, $2, $3, $4)")
        .bind(creator)
        .bind(winner)
        .bind(loser)
        .bind(super_admin)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}
