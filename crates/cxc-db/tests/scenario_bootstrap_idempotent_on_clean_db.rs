/// Bootstrapping schema twice on a clean DB must be idempotent.
///
/// DB-backed test, skipped if CXC_DATABASE_URL is not set.
#[tokio::test]
async fn bootstrap_idempotent_on_clean_db() -> anyhow::Result<()> {
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
    cxc_db::schema::bootstrap(&pool).await?;

    assert!(cxc_db::schema::table_exists(&pool, "users").await?);
    assert!(cxc_db::schema::table_exists(&pool, "payout_jobs").await?);

    Ok(())
}
