//! Append-only audit trail.
//!
//! One call, one row, never mutated: this crate exposes `record` and
//! nothing else — no update, no delete. Every balance-affecting operation
//! (credit, debit, ban, promote, demote, payout) writes exactly one row in
//! the same transaction as the balance change it explains.

use std::borrow::Cow;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use cxc_schemas::Points;

/// One audit event, ready to be written. `metadata` carries whatever
/// action-specific detail doesn't fit the typed columns (request id, bet
/// title at time of action, etc).
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub action: Cow<'static, str>,
    pub reason: Option<String>,
    pub points_delta: Option<Points>,
    pub before_points: Option<Points>,
    pub after_points: Option<Points>,
    pub related_entity: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub metadata: Value,
}

impl AuditEntry {
    pub fn new(action: impl Into<Cow<'static, str>>) -> Self {
        Self {
            actor_user_id: None,
            target_user_id: None,
            action: action.into(),
            reason: None,
            points_delta: None,
            before_points: None,
            after_points: None,
            related_entity: None,
            correlation_id: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn actor(mut self, id: Uuid) -> Self {
        self.actor_user_id = Some(id);
        self
    }

    pub fn target(mut self, id: Uuid) -> Self {
        self.target_user_id = Some(id);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn points_delta(mut self, before: Points, after: Points) -> Self {
        self.points_delta = Some(Points::new(after.raw() - before.raw()));
        self.before_points = Some(before);
        self.after_points = Some(after);
        self
    }

    pub fn related_entity(mut self, entity: impl Into<String>) -> Self {
        self.related_entity = Some(entity.into());
        self
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Insert one audit row inside the caller's transaction. Callers record
/// *after* the balance write succeeds but before commit, so a rollback
/// undoes both atomically.
pub async fn record(tx: &mut Transaction<'_, Postgres>, entry: AuditEntry) -> Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        insert into audit_log (
            actor_user_id, target_user_id, action, reason,
            points_delta, before_points, after_points,
            related_entity, correlation_id, metadata
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        returning id
        "#,
    )
    .bind(entry.actor_user_id)
    .bind(entry.target_user_id)
    .bind(entry.action.into_owned())
    .bind(entry.reason)
    .bind(entry.points_delta.map(|p| p.raw()))
    .bind(entry.before_points.map(|p| p.raw()))
    .bind(entry.after_points.map(|p| p.raw()))
    .bind(entry.related_entity)
    .bind(entry.correlation_id)
    .bind(entry.metadata)
    .fetch_one(&mut **tx)
    .await
    .context("insert audit_log row")?;

    Ok(row.0)
}

/// List the most recent audit rows for a target user, newest first. Used by
/// the admin surface; not exposed to end users.
pub async fn for_target(
    pool: &sqlx::PgPool,
    target_user_id: Uuid,
    limit: i64,
) -> Result<Vec<AuditRow>> {
    let rows = sqlx::query_as::<_, AuditRow>(
        r#"
        select id, actor_user_id, target_user_id, action, reason,
               points_delta, before_points, after_points,
               related_entity, correlation_id, metadata, created_at
        from audit_log
        where target_user_id = $1
        order by created_at desc
        limit $2
        "#,
    )
    .bind(target_user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("list audit_log for target")?;

    Ok(rows)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub target_user_id: Option<Uuid>,
    pub action: String,
    pub reason: Option<String>,
    pub points_delta: Option<i64>,
    pub before_points: Option<i64>,
    pub after_points: Option<i64>,
    pub related_entity: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
