use chrono::{Duration, Utc};
use cxc_bets::{buy, cancel, create_bet, sell, NewBet};
use cxc_ledger::SuperAdminCache;
use cxc_schemas::{OddsCenti, Points};
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
async fn buy_then_sell_at_improved_odds_profits() -> anyhow::Result<()> {
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

    let creator = seed_user(&pool, "scenario-bet-creator@example.test", 0).await?;
    let bettor = seed_user(&pool, "scenario-bet-bettor@example.test", 1000).await?;
    let super_admin = seed_user(&pool, "scenario-bet-super-admin@example.test", 0).await?;
    sqlx::query(
        "insert into user_roles (user_id, role_id) select $1, id from roles where name = 'super_admin'",
    )
    .bind(super_admin)
    .execute(&pool)
    .await?;

    let bet_id = create_bet(
        &pool,
        NewBet {
            creator_user_id: creator,
            group_id: None,
            title: "Will it rain tomorrow".into(),
            bet_type: "boolean",
            closes_at: Utc::now() + Duration::hours(1),
            options: vec![
                ("yes".into(), None, OddsCenti::new(200).unwrap()),
                ("no".into(), None, OddsCenti::new(200).unwrap()),
            ],
        },
    )
    .await?
    .unwrap();

    let (option_id,): (Uuid,) =
        sqlx::query_as("select id from bet_options where bet_id = $1 and label = 'yes'")
            .bind(bet_id)
            .fetch_one(&pool)
            .await?;

    let outcome = buy(&pool, bet_id, option_id, bettor, Points::new(100))
        .await?
        .unwrap();
    assert_eq!(outcome.odds_at_purchase, OddsCenti::new(200).unwrap());

    let (after_buy,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(bettor)
        .fetch_one(&pool)
        .await?;
    assert_eq!(after_buy, 900);

    // Odds moved from 2.00 to 3.00: selling now should cash out at the
    // improved ratio, stake * 3.00 / 2.00 = 150, fee = floor(150*0.02) = 3.
    sqlx::query("update bet_options set current_odds_centi = 300 where id = $1")
        .bind(option_id)
        .execute(&pool)
        .await?;

    let super_admin_cache = SuperAdminCache::new();
    let sell_outcome = sell(&pool, &super_admin_cache, bet_id, outcome.position_id, bettor)
        .await?
        .unwrap();
    assert_eq!(sell_outcome.fee, Points::new(3));
    assert_eq!(sell_outcome.net, Points::new(147));

    let (after_sell,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(bettor)
        .fetch_one(&pool)
        .await?;
    assert_eq!(after_sell, 900 + 147);

    sqlx::query("delete from users where id in ($1, $2, $3)")
        .bind(creator)
        .bind(bettor)
        .bind(super_admin)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}

#[tokio::test]
async fn cancel_refunds_open_positions_at_original_stake() -> anyhow::Result<()> {
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

    let creator = seed_user(&pool, "scenario-bet-cancel-creator@example.test", 0).await?;
    let bettor = seed_user(&pool, "scenario-bet-cancel-bettor@example.test", 500).await?;

    let bet_id = create_bet(
        &pool,
        NewBet {
            creator_user_id: creator,
            group_id: None,
            title: "Coin flip".into(),
            bet_type: "boolean",
            closes_at: Utc::now() + Duration::hours(1),
            options: vec![
                ("heads".into(), None, OddsCenti::new(200).unwrap()),
                ("tails".into(), None, OddsCenti::new(200).unwrap()),
            ],
        },
    )
    .await?
    .unwrap();

    let (option_id,): (Uuid,) =
        sqlx::query_as("select id from bet_options where bet_id = $1 and label = 'heads'")
            .bind(bet_id)
            .fetch_one(&pool)
            .await?;

    buy(&pool, bet_id, option_id, bettor, Points::new(200))
        .await?
        .unwrap();

    cancel(&pool, bet_id).await?.unwrap();

    let (points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(bettor)
        .fetch_one(&pool)
        .await?;
    assert_eq!(points, 500, "cancel must refund the full stake");

    let (status,): (String,) = sqlx::query_as("select status from bets where id = $1")
        .bind(bet_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(status, "cancelled");

    sqlx::query("delete from users where id in ($1, $2)")
        .bind(creator)
        .bind(bettor)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}
