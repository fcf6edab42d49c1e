use cxc_ledger::SuperAdminCache;
use cxc_schemas::Points;
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
async fn ban_escheats_points_and_rejects_protected_targets() -> anyhow::Result<()> {
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

    let actor = seed_user(&pool, "scenario-admin-actor@example.test", 0).await?;
    let target = seed_user(&pool, "scenario-admin-target@example.test", 250).await?;
    let super_admin = seed_user(&pool, "scenario-admin-super@example.test", 0).await?;
    sqlx::query(
        "insert into user_roles (user_id, role_id) select $1, id from roles where name = 'super_admin'",
    )
    .bind(super_admin)
    .execute(&pool)
    .await?;

    let super_admin_cache = SuperAdminCache::new();
    let outcome = cxc_admin::ban(&pool, &super_admin_cache, actor, target, Some("cheating".into())).await?;
    assert!(outcome.is_ok());

    let (target_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(target)
        .fetch_one(&pool)
        .await?;
    assert_eq!(target_points, 0);

    let (super_admin_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(super_admin)
        .fetch_one(&pool)
        .await?;
    assert_eq!(super_admin_points, 250);

    let (is_banned,): (bool,) = sqlx::query_as("select is_banned from users where id = $1")
        .bind(target)
        .fetch_one(&pool)
        .await?;
    assert!(is_banned);

    // Banning again is rejected.
    let second = cxc_admin::ban(&pool, &super_admin_cache, actor, target, None).await?;
    assert!(matches!(second, Err(cxc_admin::AdminError::TargetAlreadyBanned { .. })));

    // A plain admin cannot credit/debit the super-admin.
    let credit_attempt = cxc_admin::credit(
        &pool,
        actor,
        false,
        super_admin,
        Points::new(10),
        None,
    )
    .await?;
    assert!(matches!(
        credit_attempt,
        Err(cxc_admin::AdminError::TargetIsProtected { .. })
    ));

    sqlx::query("delete from users where id in ($1, $2, $3)")
        .bind(actor)
        .bind(target)
        .bind(super_admin)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}
