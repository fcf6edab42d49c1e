//! Admin routes must reject a plain user and accept a user holding
//! `admin.access`, and a credit applied through the HTTP surface must be
//! reflected in the target's balance.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use cxc_authz::Authz;
use cxc_config::{AdminBootstrap, AppConfig};
use cxc_daemon::routes::build_router;
use cxc_daemon::state::AppState;
use cxc_odds::OddsRelay;
use cxc_payout::PayoutQueue;

async fn connect() -> Option<PgPool> {
    let url = std::env::var("CXC_DATABASE_URL").ok()?;
    Some(PgPool::connect(&url).await.expect("connect to test database"))
}

async fn test_state(pool: PgPool) -> Option<AppState> {
    let redis_url = std::env::var("CXC_REDIS_URL").ok()?;
    let config = AppConfig {
        database_url: "postgres://unused".into(),
        redis_url: redis_url.clone(),
        jwt_secret: "test-only-jwt-signing-secret-0123456789".into(),
        log_level: "info".into(),
        trust_proxy: false,
        bind_addr: "127.0.0.1:0".into(),
        admin_bootstrap: AdminBootstrap::Email("super@campus.edu".into()),
        payout_max_attempts: 5,
        payout_worker_concurrency: 1,
        odds_channel: "cxc:odds".into(),
        payout_queue_key: "cxc:payouts:test-admin".into(),
    };
    let queue = PayoutQueue::connect(&redis_url, "cxc:payouts:test-admin")
        .await
        .expect("connect redis payout queue");
    let authz = Authz::new(pool.clone());
    Some(AppState::new(pool, config, authz, queue, OddsRelay::new()))
}

async fn seed_user(pool: &PgPool, email: &str, points: i64) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "insert into users (email, password_hash, points) values ($1, 'x', $2) returning id",
    )
    .bind(email)
    .bind(points)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

async fn grant_admin_access(pool: &PgPool, user_id: Uuid) {
    sqlx::query(
        r#"
        insert into roles (name) values ('admin') on conflict (name) do nothing
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        r#"
        insert into permissions (name) values ('admin.access') on conflict (name) do nothing
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        r#"
        insert into role_permissions (role_id, permission_id)
        select r.id, p.id from roles r, permissions p
        where r.name = 'admin' and p.name = 'admin.access'
        on conflict do nothing
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        r#"
        insert into user_roles (user_id, role_id)
        select $1, id from roles where name = 'admin'
        on conflict do nothing
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .unwrap();
}

async fn call(router: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("response body is not JSON");
    (status, body)
}

#[tokio::test]
async fn credit_requires_admin_access_and_moves_balance() {
    let Some(pool) = connect().await else {
        eprintln!("SKIP: CXC_DATABASE_URL not set, skipping credit_requires_admin_access_and_moves_balance");
        return;
    };
    cxc_db::schema::bootstrap(&pool).await.unwrap();
    let Some(state) = test_state(pool.clone()).await else {
        eprintln!("SKIP: CXC_REDIS_URL not set, skipping credit_requires_admin_access_and_moves_balance");
        return;
    };
    cxc_db::schema::ensure_primary_auth_secret(&pool, &state.config.jwt_secret)
        .await
        .unwrap();

    let plain_user = seed_user(&pool, &format!("plain-{}@campus.edu", Uuid::new_v4()), 0).await;
    let admin_user = seed_user(&pool, &format!("admin-{}@campus.edu", Uuid::new_v4()), 0).await;
    let target = seed_user(&pool, &format!("target-{}@campus.edu", Uuid::new_v4()), 10).await;
    grant_admin_access(&pool, admin_user).await;

    let plain_token = state.authz.issue_token(plain_user).await.unwrap();
    let admin_token = state.authz.issue_token(admin_user).await.unwrap();

    let router = build_router(state.clone());
    let forbidden_req = Request::builder()
        .method("POST")
        .uri(format!("/admin/users/{target}/credit"))
        .header("authorization", format!("Bearer {plain_token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "amount": 50 }).to_string()))
        .unwrap();
    let (status, body) = call(router, forbidden_req).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "plain user must not credit: {body}");

    let router = build_router(state.clone());
    let credit_req = Request::builder()
        .method("POST")
        .uri(format!("/admin/users/{target}/credit"))
        .header("authorization", format!("Bearer {admin_token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "amount": 50, "reason": "test grant" }).to_string()))
        .unwrap();
    let (status, body) = call(router, credit_req).await;
    assert_eq!(status, StatusCode::OK, "admin credit should succeed: {body}");

    let (points,): (i64,) = sqlx::query_as("select points from users where id = $1")
        .bind(target)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(points, 60);
}
