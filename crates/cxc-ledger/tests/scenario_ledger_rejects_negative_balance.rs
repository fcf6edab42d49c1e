use cxc_schemas::Points;
use serde_json::json;
use uuid::Uuid;

/// DB-backed test, skipped if CXC_DATABASE_URL is not set.
#[tokio::test]
async fn apply_delta_rejects_overdraw() -> anyhow::Result<()> {
    let url = match std::env::var(cxc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: CXC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    cxc_db::schema::bootstrap(&pool).await?;

    let user_id: (Uuid,) = sqlx::query_as(
        "insert into users (email, password_hash, points) values ($1, $2, $3) returning id",
    )
    .bind("scenario-ledger-overdraw@example.test")
    .bind("x")
    .bind(50_i64)
    .fetch_one(&pool)
    .await?;

    let mut tx = pool.begin().await?;
    let result = cxc_ledger::apply_delta(
        &mut tx,
        user_id.0,
        Points::new(-100),
        "scenario_test_debit",
        None,
        None,
        None,
        json!({}),
    )
    .await;
    assert!(result.is_err(), "overdraw must be rejected");
    tx.rollback().await?;

    let (remaining,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(user_id.0)
        .fetch_one(&pool)
        .await?;
    assert_eq!(remaining, 50, "rejected debit must not touch the stored balance");

    sqlx::query("delete from users where id = $1")
        .bind(user_id.0)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}

#[tokio::test]
async fn transfer_moves_points_and_records_both_sides() -> anyhow::Result<()> {
    let url = match std::env::var(cxc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: CXC_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    cxc_db::schema::bootstrap(&pool).await?;

    let from: (Uuid,) = sqlx::query_as(
        "insert into users (email, password_hash, points) values ($1, $2, $3) returning id",
    )
    .bind("scenario-ledger-transfer-from@example.test")
    .bind("x")
    .bind(100_i64)
    .fetch_one(&pool)
    .await?;
    let to: (Uuid,) = sqlx::query_as(
        "insert into users (email, password_hash, points) values ($1, $2, $3) returning id",
    )
    .bind("scenario-ledger-transfer-to@example.test")
    .bind("x")
    .bind(0_i64)
    .fetch_one(&pool)
    .await?;

    let mut tx = pool.begin().await?;
    cxc_ledger::transfer(
        &mut tx,
        from.0,
        to.0,
        Points::new(40),
        "scenario_test_transfer",
        None,
        None,
        None,
    )
    .await?;
    tx.commit().await?;

    let (from_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(from.0)
        .fetch_one(&pool)
        .await?;
    let (to_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(to.0)
        .fetch_one(&pool)
        .await?;
    assert_eq!(from_points, 60);
    assert_eq!(to_points, 40);

    let debit_row: (String, Option<Uuid>) = sqlx::query_as(
        "select action, correlation_id from audit_log where target_user_id = $1 and action = $2",
    )
    .bind(from.0)
    .bind("scenario_test_transfer_debit")
    .fetch_one(&pool)
    .await?;
    let credit_row: (String, Option<Uuid>) = sqlx::query_as(
        "select action, correlation_id from audit_log where target_user_id = $1 and action = $2",
    )
    .bind(to.0)
    .bind("scenario_test_transfer_credit")
    .fetch_one(&pool)
    .await?;
    assert_eq!(debit_row.0, "scenario_test_transfer_debit");
    assert_eq!(credit_row.0, "scenario_test_transfer_credit");
    assert!(debit_row.1.is_some(), "transfer debit row must carry a correlation id");
    assert_eq!(debit_row.1, credit_row.1, "debit/credit rows must share a correlation id");

    sqlx::query("delete from users where id in ($1, $2)")
        .bind(from.0)
        .bind(to.0)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}
