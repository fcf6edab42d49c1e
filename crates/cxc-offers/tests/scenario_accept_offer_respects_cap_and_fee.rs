use cxc_ledger::SuperAdminCache;
use cxc_offers::{accept_offer, NewOffer, OfferError};
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
async fn accept_charges_cost_plus_fee_and_enforces_cap() -> anyhow::Result<()> {
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

    let creator = seed_user(&pool, "scenario-offer-creator@example.test", 0).await?;
    let buyer = seed_user(&pool, "scenario-offer-buyer@example.test", 1000).await?;
    let super_admin = seed_user(&pool, "scenario-offer-super-admin@example.test", 0).await?;
    sqlx::query(
        "insert into user_roles (user_id, role_id) select $1, id from roles where name = 'super_admin'",
    )
    .bind(super_admin)
    .execute(&pool)
    .await?;

    let offer_id = cxc_offers::create_offer(
        &pool,
        NewOffer {
            creator_user_id: creator,
            group_id: None,
            title: "Tutoring session".into(),
            description: "one hour".into(),
            points_cost: Points::new(100),
            max_acceptances: Some(1),
        },
    )
    .await?;

    let cache = SuperAdminCache::new();
    let outcome = accept_offer(&pool, &cache, offer_id, buyer).await?.unwrap();
    assert_eq!(outcome.fee, Points::new(2));
    assert_eq!(outcome.total_charged, Points::new(102));

    let (buyer_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(buyer)
        .fetch_one(&pool)
        .await?;
    assert_eq!(buyer_points, 898);

    let (creator_points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(creator)
        .fetch_one(&pool)
        .await?;
    assert_eq!(creator_points, 100);

    // Cap is now reached; a second acceptance must be rejected.
    let second_buyer = seed_user(&pool, "scenario-offer-second-buyer@example.test", 1000).await?;
    let second = accept_offer(&pool, &cache, offer_id, second_buyer).await?;
    assert_eq!(second, Err(OfferError::CapReached { offer_id }));

    sqlx::query("delete from users where id in ($1, $2, $3, $4)")
        .bind(creator)
        .bind(buyer)
        .bind(super_admin)
        .bind(second_buyer)
        .execute(&pool)
        .await
        .ok();

    Ok(())
}
