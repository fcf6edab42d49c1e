//! Append-boundary for `users.points`.
//!
//! No code outside this crate should write `users.points` directly. Every
//! write goes through [`apply_delta`] or [`transfer`], both of which run
//! inside a caller-supplied transaction, lock the affected row(s) with
//! `SELECT ... FOR UPDATE`, reject any write that would take a balance
//! negative, and record an [`cxc_audit::AuditEntry`] in the same
//! transaction. The row-level CHECK constraint and trigger in `cxc-db` are
//! the last line of defence if this boundary is ever bypassed.

use std::sync::Arc;

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::RwLock;
use uuid::Uuid;

use cxc_audit::AuditEntry;
use cxc_schemas::Points;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Applying the delta would take the user's balance below zero.
    InsufficientBalance {
        user_id: Uuid,
        balance: Points,
        delta: Points,
    },
    /// `amount` passed to `transfer` was not strictly positive.
    NonPositiveAmount { amount: Points },
    /// The referenced user does not exist (or was deleted mid-transaction).
    UnknownUser { user_id: Uuid },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientBalance {
                user_id,
                balance,
                delta,
            } => write!(
                f,
                "ledger: user {user_id} balance {} cannot absorb delta {}",
                balance.raw(),
                delta.raw()
            ),
            Self::NonPositiveAmount { amount } => {
                write!(f, "ledger: transfer amount must be > 0, got {}", amount.raw())
            }
            Self::UnknownUser { user_id } => write!(f, "ledger: unknown user {user_id}"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Result of a successful balance write, used by callers that need to
/// report before/after balances (e.g. admin credit/debit responses).
#[derive(Debug, Clone, Copy)]
pub struct BalanceChange {
    pub before: Points,
    pub after: Points,
}

async fn lock_balance(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Points, LedgerError> {
    let row: Option<(i64,)> =
        sqlx::query_as("select points from users where id = $1 for update")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|_| LedgerError::UnknownUser { user_id })?;

    match row {
        Some((points,)) => Ok(Points::new(points)),
        None => Err(LedgerError::UnknownUser { user_id }),
    }
}

/// Lock the row, validate and write the new balance. Shared by `apply_delta`
/// and `transfer`, which differ only in how they shape the audit row.
async fn write_balance(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    delta: Points,
) -> Result<BalanceChange, LedgerError> {
    let before = lock_balance(tx, user_id).await?;
    let after = before.checked_add(delta).ok_or(LedgerError::InsufficientBalance {
        user_id,
        balance: before,
        delta,
    })?;
    if after.is_negative() {
        return Err(LedgerError::InsufficientBalance {
            user_id,
            balance: before,
            delta,
        });
    }

    sqlx::query("update users set points = $1 where id = $2")
        .bind(after.raw())
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(|_| LedgerError::UnknownUser { user_id })?;

    Ok(BalanceChange { before, after })
}

/// Apply a signed delta to one user's balance. `delta` may be negative (a
/// debit) as long as the resulting balance stays non-negative.
///
/// `action`/`reason`/`metadata` become the audit row recorded alongside the
/// balance write; `actor_user_id` is the admin or system principal driving
/// the change (`None` for self-service operations like buying a bet
/// position, where the user is both actor and target).
pub async fn apply_delta(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    delta: Points,
    action: &'static str,
    actor_user_id: Option<Uuid>,
    reason: Option<String>,
    related_entity: Option<String>,
    metadata: Value,
) -> Result<BalanceChange, LedgerError> {
    let change = write_balance(tx, user_id, delta).await?;

    let mut entry = AuditEntry::new(action)
        .target(user_id)
        .points_delta(change.before, change.after)
        .metadata(metadata);
    if let Some(actor) = actor_user_id {
        entry = entry.actor(actor);
    }
    if let Some(reason) = reason {
        entry = entry.reason(reason);
    }
    if let Some(entity) = related_entity {
        entry = entry.related_entity(entity);
    }

    cxc_audit::record(tx, entry)
        .await
        .map_err(|_| LedgerError::UnknownUser { user_id })?;

    Ok(change)
}

/// Move `amount` (must be `> 0`) from `from` to `to`, locking both rows in a
/// fixed order (by id) to avoid deadlocking against a concurrent transfer in
/// the opposite direction. Emits a paired audit row per side, `action`
/// suffixed `_debit`/`_credit`, sharing one correlation id.
pub async fn transfer(
    tx: &mut Transaction<'_, Postgres>,
    from: Uuid,
    to: Uuid,
    amount: Points,
    action: &'static str,
    actor_user_id: Option<Uuid>,
    reason: Option<String>,
    related_entity: Option<String>,
) -> Result<(BalanceChange, BalanceChange), LedgerError> {
    if !amount.is_positive() {
        return Err(LedgerError::NonPositiveAmount { amount });
    }

    // Lock in id order regardless of transfer direction: two transfers
    // between the same pair of users always acquire locks in the same
    // sequence, so neither can deadlock on the other.
    let (first, second) = if from < to { (from, to) } else { (to, from) };
    let _ = lock_balance(tx, first).await?;
    let _ = lock_balance(tx, second).await?;

    let correlation_id = Uuid::new_v4();

    let debit = write_balance(tx, from, Points::new(-amount.raw())).await?;
    let mut debit_entry = AuditEntry::new(format!("{action}_debit"))
        .target(from)
        .points_delta(debit.before, debit.after)
        .correlation_id(correlation_id)
        .metadata(Value::Object(Default::default()));
    if let Some(actor) = actor_user_id {
        debit_entry = debit_entry.actor(actor);
    }
    if let Some(reason) = reason.clone() {
        debit_entry = debit_entry.reason(reason);
    }
    if let Some(entity) = related_entity.clone() {
        debit_entry = debit_entry.related_entity(entity);
    }
    cxc_audit::record(tx, debit_entry)
        .await
        .map_err(|_| LedgerError::UnknownUser { user_id: from })?;

    let credit = write_balance(tx, to, amount).await?;
    let mut credit_entry = AuditEntry::new(format!("{action}_credit"))
        .target(to)
        .points_delta(credit.before, credit.after)
        .correlation_id(correlation_id)
        .metadata(Value::Object(Default::default()));
    if let Some(actor) = actor_user_id {
        credit_entry = credit_entry.actor(actor);
    }
    if let Some(reason) = reason {
        credit_entry = credit_entry.reason(reason);
    }
    if let Some(entity) = related_entity {
        credit_entry = credit_entry.related_entity(entity);
    }
    cxc_audit::record(tx, credit_entry)
        .await
        .map_err(|_| LedgerError::UnknownUser { user_id: to })?;

    Ok((debit, credit))
}

/// Process-memory cache of the super-admin user id that all fee revenue is
/// credited to. Resolved once from RBAC on first miss; cheap to clone and
/// share across the offer/bet/payout/admin engines.
#[derive(Clone, Default)]
pub struct SuperAdminCache {
    cached: Arc<RwLock<Option<Uuid>>>,
}

impl SuperAdminCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, pool: &PgPool) -> Result<Uuid, LedgerError> {
        {
            let cached = self.cached.read().await;
            if let Some(id) = *cached {
                return Ok(id);
            }
        }

        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            select u.id from users u
            join user_roles ur on ur.user_id = u.id
            join roles r on r.id = ur.role_id
            where r.name = 'super_admin'
            order by u.created_at asc
            limit 1
            "#,
        )
        .fetch_optional(pool)
        .await
        .map_err(|_| LedgerError::UnknownUser { user_id: Uuid::nil() })?;

        let id = row.map(|(id,)| id).ok_or(LedgerError::UnknownUser { user_id: Uuid::nil() })?;
        let mut cached = self.cached.write().await;
        *cached = Some(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_user() {
        let user_id = Uuid::nil();
        let err = LedgerError::InsufficientBalance {
            user_id,
            balance: Points::new(10),
            delta: Points::new(-20),
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("-20"));
    }

    #[test]
    fn non_positive_transfer_amount_is_rejected_before_any_lock() {
        let err = LedgerError::NonPositiveAmount {
            amount: Points::new(0),
        };
        assert!(err.to_string().contains("must be > 0"));
    }
}
