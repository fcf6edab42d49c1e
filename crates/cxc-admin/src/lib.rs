//! Administrative operations: credit/debit, ban-with-escheat,
//! promote/demote, password reset, device/session revoke.
//!
//! Every balance-moving path here delegates to `cxc-ledger` rather than
//! touching `users.points` itself — this crate only adds the admin-specific
//! guards (no action against a super-admin unless the actor is one too) on
//! top of the ledger's invariants.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use cxc_ledger::SuperAdminCache;
use cxc_schemas::Points;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    UserNotFound { user_id: Uuid },
    TargetIsProtected { user_id: Uuid },
    TargetAlreadyBanned { user_id: Uuid },
    InsufficientPoints { user_id: Uuid },
}

impl std::fmt::Display for AdminError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserNotFound { user_id } => write!(f, "user {user_id} not found"),
            Self::TargetIsProtected { user_id } => write!(
                f,
                "user {user_id} is an admin or super-admin and cannot be targeted by this actor"
            ),
            Self::TargetAlreadyBanned { user_id } => write!(f, "user {user_id} is already banned"),
            Self::InsufficientPoints { user_id } => {
                write!(f, "user {user_id} has insufficient points")
            }
        }
    }
}

impl std::error::Error for AdminError {}

async fn has_permission(pool: &PgPool, user_id: Uuid, permission: &str) -> anyhow::Result<bool> {
    let (has,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from user_roles ur
            join role_permissions rp on rp.role_id = ur.role_id
            join permissions p on p.id = rp.permission_id
            where ur.user_id = $1 and p.name = $2
        )
        "#,
    )
    .bind(user_id)
    .bind(permission)
    .fetch_one(pool)
    .await?;
    Ok(has)
}

/// `true` when a credit/debit/ban against `target` requires the actor to be
/// a super-admin: any admin or super-admin target is protected from plain
/// admins.
async fn target_is_protected(pool: &PgPool, target: Uuid) -> anyhow::Result<bool> {
    Ok(has_permission(pool, target, cxc_authz_permission::ADMIN_ACCESS).await?)
}

/// Permission name constants duplicated here rather than depending on
/// `cxc-authz` — this crate only needs the string, not token verification.
mod cxc_authz_permission {
    pub const ADMIN_ACCESS: &str = "admin.access";
}

async fn guard_target(
    pool: &PgPool,
    actor_is_super_admin: bool,
    target: Uuid,
) -> anyhow::Result<Result<(), AdminError>> {
    if actor_is_super_admin {
        return Ok(Ok(()));
    }
    if target_is_protected(pool, target).await? {
        return Ok(Err(AdminError::TargetIsProtected { user_id: target }));
    }
    Ok(Ok(()))
}

pub async fn credit(
    pool: &PgPool,
    actor: Uuid,
    actor_is_super_admin: bool,
    target: Uuid,
    amount: Points,
    reason: Option<String>,
) -> anyhow::Result<Result<(), AdminError>> {
    if let Err(e) = guard_target(pool, actor_is_super_admin, target).await? {
        return Ok(Err(e));
    }

    let mut tx = pool.begin().await?;
    cxc_ledger::apply_delta(
        &mut tx,
        target,
        amount,
        "admin_credit",
        Some(actor),
        reason,
        None,
        serde_json::json!({}),
    )
    .await
    .map_err(|e| anyhow::anyhow!(e))?;
    tx.commit().await?;
    Ok(Ok(()))
}

pub async fn debit(
    pool: &PgPool,
    actor: Uuid,
    actor_is_super_admin: bool,
    target: Uuid,
    amount: Points,
    reason: Option<String>,
) -> anyhow::Result<Result<(), AdminError>> {
    if let Err(e) = guard_target(pool, actor_is_super_admin, target).await? {
        return Ok(Err(e));
    }

    let mut tx = pool.begin().await?;
    let result = cxc_ledger::apply_delta(
        &mut tx,
        target,
        Points::new(-amount.raw()),
        "admin_debit",
        Some(actor),
        reason,
        None,
        serde_json::json!({}),
    )
    .await;

    match result {
        Ok(_) => {
            tx.commit().await?;
            Ok(Ok(()))
        }
        Err(_) => Ok(Err(AdminError::InsufficientPoints { user_id: target })),
    }
}

/// Ban `target`: transfer every remaining point to the super-admin, set
/// `is_banned`/`banned_at`. Rejects admin/super-admin targets outright
/// (escalation is never allowed via ban).
pub async fn ban(
    pool: &PgPool,
    super_admin: &SuperAdminCache,
    actor: Uuid,
    target: Uuid,
    reason: Option<String>,
) -> anyhow::Result<Result<(), AdminError>> {
    if target_is_protected(pool, target).await? {
        return Ok(Err(AdminError::TargetIsProtected { user_id: target }));
    }

    let row: Option<(bool,)> = sqlx::query_as("select is_banned from users where id = $1")
        .bind(target)
        .fetch_optional(pool)
        .await?;
    let (already_banned,) = match row {
        Some(row) => row,
        None => return Ok(Err(AdminError::UserNotFound { user_id: target })),
    };
    if already_banned {
        return Ok(Err(AdminError::TargetAlreadyBanned { user_id: target }));
    }

    let super_admin_id = super_admin.get(pool).await?;

    let mut tx = pool.begin().await?;

    let (remaining,): (i64,) = sqlx::query_as("select points from users where id = $1 for update")
        .bind(target)
        .fetch_one(&mut *tx)
        .await?;

    if remaining > 0 {
        cxc_ledger::transfer(
            &mut tx,
            target,
            super_admin_id,
            Points::new(remaining),
            "ban_transfer",
            Some(actor),
            reason.clone(),
            None,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    }

    sqlx::query("update users set is_banned = true, banned_at = now() where id = $1")
        .bind(target)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Ok(()))
}

pub async fn unban(pool: &PgPool, target: Uuid) -> anyhow::Result<()> {
    sqlx::query("update users set is_banned = false where id = $1")
        .bind(target)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn promote(pool: &PgPool, target: Uuid, role_name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        insert into user_roles (user_id, role_id)
        select $1, id from roles where name = $2
        on conflict do nothing
        "#,
    )
    .bind(target)
    .bind(role_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn demote(pool: &PgPool, target: Uuid, role_name: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        delete from user_roles
        where user_id = $1 and role_id = (select id from roles where name = $2)
        "#,
    )
    .bind(target)
    .bind(role_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Generate a random temp password, store its argon2 hash, and revoke every
/// refresh token the target holds. Returns the plaintext temp password —
/// the only time it ever exists outside the user's head.
pub async fn reset_password(pool: &PgPool, target: Uuid) -> anyhow::Result<String> {
    let temp_password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(temp_password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash failed: {e}"))?
        .to_string();

    let mut tx = pool.begin().await?;
    sqlx::query("update users set password_hash = $1 where id = $2")
        .bind(&hash)
        .bind(target)
        .execute(&mut *tx)
        .await?;
    sqlx::query("update refresh_tokens set revoked_at = now() where user_id = $1 and revoked_at is null")
        .bind(target)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(temp_password)
}

pub async fn revoke_device(pool: &PgPool, device_id: Uuid) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("update user_devices set revoked_at = now() where id = $1")
        .bind(device_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("update refresh_tokens set revoked_at = now() where device_id = $1 and revoked_at is null")
        .bind(device_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn revoke_session(pool: &PgPool, refresh_token_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("update refresh_tokens set revoked_at = now() where id = $1 and revoked_at is null")
        .bind(refresh_token_id)
        .execute(pool)
        .await?;
    Ok(())
}
