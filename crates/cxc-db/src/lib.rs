//! Connection pooling and idempotent schema bootstrap.
//!
//! This crate owns the shape of the schema and the pool. Engine crates
//! (`cxc-ledger`, `cxc-offers`, `cxc-bets`, `cxc-payout`, `cxc-admin`,
//! `cxc-authz`, `cxc-idempotency`, `cxc-access`) issue their own queries
//! directly against a shared `sqlx::PgPool`/`Transaction` — this crate does
//! not mediate every query, it only guarantees the tables exist before
//! anyone else touches them.

pub mod schema;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const ENV_DB_URL: &str = "CXC_DATABASE_URL";

/// Connect to Postgres using `CXC_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run the idempotent schema bootstrap, then seed RBAC and the super-admin
/// role assignment/JWT secret from `cfg`. Safe to call on every startup.
pub async fn bootstrap_all(pool: &PgPool, cfg: &cxc_config::AppConfig) -> Result<()> {
    schema::bootstrap(pool).await?;

    match &cfg.admin_bootstrap {
        cxc_config::AdminBootstrap::Email(email) => {
            schema::bootstrap_super_admin_by_email(pool, email).await?;
        }
        cxc_config::AdminBootstrap::UserId(id) => {
            schema::bootstrap_super_admin_by_id(pool, *id).await?;
        }
    }

    schema::ensure_primary_auth_secret(pool, &cfg.jwt_secret).await?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let has_users_table = schema::table_exists(pool, "users").await?;

    Ok(DbStatus {
        ok: one == 1,
        has_users_table,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_users_table: bool,
}
