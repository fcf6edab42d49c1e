/// `users.points` must never go negative, enforced by both a CHECK
/// constraint and a BEFORE trigger.
///
/// DB-backed test, skipped if CXC_DATABASE_URL is not set.
#[tokio::test]
async fn users_points_cannot_go_negative() -> anyhow::Result<()> {
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

    let result = sqlx::query(
        "insert into users (email, password_hash, points) values ($1, $2, $3)",
    )
    .bind("scenario-neg-points@example.test")
    .bind("x")
    .bind(-1_i64)
    .execute(&pool)
    .await;

    assert!(result.is_err(), "negative points insert must be rejected");

    sqlx::query("delete from users where email = $1")
        .bind("scenario-neg-points@example.test")
        .execute(&pool)
        .await
        .ok();

    Ok(())
}
