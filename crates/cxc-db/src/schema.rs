//! Idempotent DDL and RBAC/super-admin bootstrap.
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS`; columns added later
//! in the product's life are guarded by an information-schema existence
//! check before `ALTER TABLE ... ADD COLUMN`, so re-running `bootstrap` on an
//! already-current database is always a no-op. This mirrors the additive,
//! ad-hoc-ALTER schema evolution style of the system this crate was modeled
//! on, rather than a versioned migration file set.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

/// Run the full idempotent bootstrap: tables, constraints/triggers, default
/// roles/permissions, and (if configured) the super-admin role assignment.
///
/// Retries on transient "relation does not exist" races (a concurrent
/// bootstrap from another replica mid-flight) with capped exponential
/// backoff; any other error aborts immediately.
pub async fn bootstrap(pool: &PgPool) -> Result<()> {
    const MAX_ATTEMPTS: u32 = 5;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match try_bootstrap(pool).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_ATTEMPTS && is_transient_schema_race(&e) => {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                warn!(attempt, ?backoff, error = %e, "schema bootstrap hit a transient race, retrying");
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient_schema_race(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("does not exist") || msg.contains("no schema has been selected")
}

async fn try_bootstrap(pool: &PgPool) -> Result<()> {
    create_core_tables(pool).await?;
    create_economy_tables(pool).await?;
    create_operational_tables(pool).await?;
    ensure_points_non_negative_guard(pool).await?;
    seed_rbac(pool).await?;
    info!("schema bootstrap complete");
    Ok(())
}

pub async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("table_exists({table})"))?;
    Ok(exists)
}

async fn column_exists(pool: &PgPool, table: &str, column: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.columns
            where table_schema = 'public' and table_name = $1 and column_name = $2
        )
        "#,
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await
    .with_context(|| format!("column_exists({table}.{column})"))?;
    Ok(exists)
}

/// Add `column_def` to `table` iff it is not already present. `column_def`
/// must be a full `ADD COLUMN` fragment, e.g. `"banned_at timestamptz"`.
async fn ensure_column(pool: &PgPool, table: &str, column: &str, column_def: &str) -> Result<()> {
    if column_exists(pool, table, column).await? {
        return Ok(());
    }
    let stmt = format!("alter table {table} add column {column_def}");
    sqlx::query(&stmt)
        .execute(pool)
        .await
        .with_context(|| format!("ensure_column({table}.{column})"))?;
    Ok(())
}

async fn create_core_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        create table if not exists users (
            id uuid primary key default gen_random_uuid(),
            email text not null unique,
            password_hash text not null,
            points bigint not null default 0,
            is_banned boolean not null default false,
            banned_at timestamptz,
            profile_description text,
            profile_alias text,
            profile_quote text,
            profile_visibility text not null default 'public',
            created_at timestamptz not null default now(),
            constraint users_points_non_negative check (points >= 0)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create users")?;

    // Additive columns introduced after the initial table shape, each
    // guarded so re-running bootstrap against a current DB is a no-op.
    ensure_column(pool, "users", "banned_at", "banned_at timestamptz").await?;

    sqlx::query(
        r#"
        create table if not exists roles (
            id uuid primary key default gen_random_uuid(),
            name text not null unique
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create roles")?;

    sqlx::query(
        r#"
        create table if not exists permissions (
            id uuid primary key default gen_random_uuid(),
            name text not null unique
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create permissions")?;

    sqlx::query(
        r#"
        create table if not exists role_permissions (
            role_id uuid not null references roles(id) on delete cascade,
            permission_id uuid not null references permissions(id) on delete cascade,
            primary key (role_id, permission_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create role_permissions")?;

    sqlx::query(
        r#"
        create table if not exists user_roles (
            user_id uuid not null references users(id) on delete cascade,
            role_id uuid not null references roles(id) on delete cascade,
            primary key (user_id, role_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create user_roles")?;

    sqlx::query(
        r#"
        create table if not exists auth_secrets (
            id uuid primary key default gen_random_uuid(),
            secret text not null,
            is_primary boolean not null default false,
            expires_at timestamptz,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create auth_secrets")?;

    sqlx::query(
        r#"
        create table if not exists groups (
            id uuid primary key default gen_random_uuid(),
            name text not null,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create groups")?;

    sqlx::query(
        r#"
        create table if not exists group_members (
            group_id uuid not null references groups(id) on delete cascade,
            user_id uuid not null references users(id) on delete cascade,
            primary key (group_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create group_members")?;

    Ok(())
}

async fn create_economy_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        create table if not exists offers (
            id uuid primary key default gen_random_uuid(),
            creator_user_id uuid not null references users(id),
            group_id uuid references groups(id),
            title text not null,
            description text not null default '',
            points_cost bigint not null,
            max_acceptances int,
            accepted_count int not null default 0,
            is_active boolean not null default true,
            created_at timestamptz not null default now(),
            constraint offers_points_cost_positive check (points_cost > 0)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create offers")?;

    sqlx::query(
        r#"
        create table if not exists offer_acceptances (
            id uuid primary key default gen_random_uuid(),
            offer_id uuid not null references offers(id),
            buyer_user_id uuid not null references users(id),
            fee_points bigint not null,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create offer_acceptances")?;

    sqlx::query(
        r#"
        create table if not exists offer_reviews (
            id uuid primary key default gen_random_uuid(),
            offer_id uuid not null references offers(id),
            reviewer_user_id uuid not null references users(id),
            rating smallint not null,
            comment text,
            created_at timestamptz not null default now(),
            constraint offer_reviews_rating_range check (rating between 1 and 5),
            constraint offer_reviews_one_per_reviewer unique (offer_id, reviewer_user_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create offer_reviews")?;

    sqlx::query(
        r#"
        create table if not exists bets (
            id uuid primary key default gen_random_uuid(),
            creator_user_id uuid not null references users(id),
            group_id uuid references groups(id),
            title text not null,
            bet_type text not null,
            closes_at timestamptz not null,
            status text not null default 'open',
            result_option_id uuid,
            resolved_at timestamptz,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create bets")?;

    sqlx::query(
        r#"
        create table if not exists bet_options (
            id uuid primary key default gen_random_uuid(),
            bet_id uuid not null references bets(id),
            label text not null,
            numeric_value double precision,
            current_odds_centi bigint not null,
            constraint bet_options_odds_floor check (current_odds_centi >= 101)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create bet_options")?;

    sqlx::query(
        r#"
        create table if not exists bet_positions (
            id uuid primary key default gen_random_uuid(),
            bet_id uuid not null references bets(id),
            bet_option_id uuid not null references bet_options(id),
            user_id uuid not null references users(id),
            stake_points bigint not null,
            odds_at_purchase_centi bigint not null,
            status text not null default 'open',
            payout_points bigint,
            sold_points bigint,
            created_at timestamptz not null default now(),
            constraint bet_positions_stake_positive check (stake_points > 0)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create bet_positions")?;

    sqlx::query(
        r#"
        create table if not exists payout_jobs (
            id uuid primary key default gen_random_uuid(),
            bet_id uuid not null unique references bets(id),
            result_option_id uuid not null references bet_options(id),
            resolved_by uuid not null references users(id),
            payload jsonb not null default '{}',
            status text not null default 'queued',
            attempts int not null default 0,
            max_attempts int not null,
            next_attempt_at timestamptz,
            started_at timestamptz,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create payout_jobs")?;

    Ok(())
}

async fn create_operational_tables(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        create table if not exists idempotency_keys (
            idem_key text not null,
            user_id uuid not null references users(id),
            route text not null,
            method text not null,
            request_hash text not null,
            status text not null default 'processing',
            response_status int,
            response_body jsonb,
            completed_at timestamptz,
            created_at timestamptz not null default now(),
            primary key (idem_key, user_id, route, method)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create idempotency_keys")?;

    sqlx::query(
        r#"
        create table if not exists audit_log (
            id uuid primary key default gen_random_uuid(),
            actor_user_id uuid references users(id),
            target_user_id uuid references users(id),
            action text not null,
            reason text,
            points_delta bigint,
            before_points bigint,
            after_points bigint,
            related_entity text,
            correlation_id uuid,
            metadata jsonb not null default '{}',
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create audit_log")?;

    sqlx::query(
        r#"
        create table if not exists user_devices (
            id uuid primary key default gen_random_uuid(),
            user_id uuid not null references users(id),
            device_name text not null default '',
            revoked_at timestamptz,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create user_devices")?;

    sqlx::query(
        r#"
        create table if not exists refresh_tokens (
            id uuid primary key default gen_random_uuid(),
            user_id uuid not null references users(id),
            device_id uuid references user_devices(id),
            revoked_at timestamptz,
            created_at timestamptz not null default now()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("create refresh_tokens")?;

    Ok(())
}

/// BEFORE trigger as a second line of defence behind the CHECK constraint —
/// belt and braces against any code path that writes `users.points` outside
/// `cxc-ledger`.
async fn ensure_points_non_negative_guard(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        create or replace function cxc_reject_negative_points() returns trigger as $$
        begin
            if new.points < 0 then
                raise exception 'users.points must never go negative (user %, attempted %)', new.id, new.points;
            end if;
            return new;
        end;
        $$ language plpgsql
        "#,
    )
    .execute(pool)
    .await
    .context("create cxc_reject_negative_points function")?;

    let trigger_exists: (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from pg_trigger where tgname = 'cxc_users_points_guard'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("check trigger existence")?;

    if !trigger_exists.0 {
        sqlx::query(
            r#"
            create trigger cxc_users_points_guard
            before insert or update of points on users
            for each row execute function cxc_reject_negative_points()
            "#,
        )
        .execute(pool)
        .await
        .context("create cxc_users_points_guard trigger")?;
    }

    Ok(())
}

const DEFAULT_ROLES: &[&str] = &["admin", "super_admin"];
const DEFAULT_PERMISSIONS: &[&str] = &["admin.access", "admin.super"];

/// Default role→permission mapping: `admin` gets `admin.access`;
/// `super_admin` gets both.
async fn seed_rbac(pool: &PgPool) -> Result<()> {
    for role in DEFAULT_ROLES {
        sqlx::query("insert into roles (name) values ($1) on conflict (name) do nothing")
            .bind(role)
            .execute(pool)
            .await
            .with_context(|| format!("seed role {role}"))?;
    }
    for perm in DEFAULT_PERMISSIONS {
        sqlx::query("insert into permissions (name) values ($1) on conflict (name) do nothing")
            .bind(perm)
            .execute(pool)
            .await
            .with_context(|| format!("seed permission {perm}"))?;
    }

    grant(pool, "admin", "admin.access").await?;
    grant(pool, "super_admin", "admin.access").await?;
    grant(pool, "super_admin", "admin.super").await?;

    Ok(())
}

async fn grant(pool: &PgPool, role: &str, permission: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into role_permissions (role_id, permission_id)
        select r.id, p.id from roles r, permissions p
        where r.name = $1 and p.name = $2
        on conflict do nothing
        "#,
    )
    .bind(role)
    .bind(permission)
    .execute(pool)
    .await
    .with_context(|| format!("grant {permission} to {role}"))?;
    Ok(())
}

/// Ensure a super-admin role assignment exists for the bootstrap target,
/// identified by email or user id, and that a primary JWT signing secret
/// exists. Idempotent: safe to call on every startup.
pub async fn bootstrap_super_admin_by_email(pool: &PgPool, email: &str) -> Result<()> {
    let user_id: Option<(uuid::Uuid,)> = sqlx::query_as("select id from users where email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("lookup bootstrap admin by email")?;

    let Some((user_id,)) = user_id else {
        warn!(email, "admin bootstrap email does not match any existing user yet");
        return Ok(());
    };
    assign_super_admin_role(pool, user_id).await
}

pub async fn bootstrap_super_admin_by_id(pool: &PgPool, user_id: uuid::Uuid) -> Result<()> {
    assign_super_admin_role(pool, user_id).await
}

async fn assign_super_admin_role(pool: &PgPool, user_id: uuid::Uuid) -> Result<()> {
    sqlx::query(
        r#"
        insert into user_roles (user_id, role_id)
        select $1, r.id from roles r where r.name = 'super_admin'
        on conflict do nothing
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .context("assign super_admin role")?;
    Ok(())
}

/// Insert `secret` as the primary `AuthSecret` iff no primary secret exists
/// yet. Called once at startup with the configured JWT secret.
pub async fn ensure_primary_auth_secret(pool: &PgPool, secret: &str) -> Result<()> {
    let existing: (bool,) = sqlx::query_as(
        "select exists(select 1 from auth_secrets where is_primary = true)",
    )
    .fetch_one(pool)
    .await
    .context("check existing primary auth secret")?;

    if existing.0 {
        return Ok(());
    }

    sqlx::query("insert into auth_secrets (secret, is_primary) values ($1, true)")
        .bind(secret)
        .execute(pool)
        .await
        .context("insert primary auth secret")?;
    Ok(())
}
