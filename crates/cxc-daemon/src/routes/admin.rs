use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use cxc_authz::AuthenticatedPrincipal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cxc_schemas::Points;

use crate::envelope::{created, ok};
use crate::error::ApiError;
use crate::idempotency_guard::{self, IdemStart};
use crate::middleware::AuthUser;
use crate::state::AppState;

fn require_admin(principal: &AuthenticatedPrincipal) -> Result<(), ApiError> {
    if !principal.is_admin() {
        return Err(ApiError::forbidden("admin.access permission required"));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CreditDebitRequest {
    pub amount: i64,
    pub reason: Option<String>,
}

pub async fn credit(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
    Json(body): Json<CreditDebitRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    if body.amount <= 0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    cxc_admin::credit(
        &state.pool,
        principal.user_id,
        principal.is_super_admin(),
        target,
        Points::new(body.amount),
        body.reason,
    )
    .await??;
    Ok(ok(serde_json::json!({ "credited": true })))
}

pub async fn debit(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
    Json(body): Json<CreditDebitRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    if body.amount <= 0 {
        return Err(ApiError::validation("amount must be positive"));
    }
    cxc_admin::debit(
        &state.pool,
        principal.user_id,
        principal.is_super_admin(),
        target,
        Points::new(body.amount),
        body.reason,
    )
    .await??;
    Ok(ok(serde_json::json!({ "debited": true })))
}

#[derive(Deserialize)]
pub struct BanRequest {
    pub reason: Option<String>,
}

pub async fn ban(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
    Json(body): Json<BanRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    cxc_admin::ban(
        &state.pool,
        &state.super_admin,
        principal.user_id,
        target,
        body.reason,
    )
    .await??;
    Ok(ok(serde_json::json!({ "banned": true })))
}

pub async fn unban(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    cxc_admin::unban(&state.pool, target).await?;
    Ok(ok(serde_json::json!({ "banned": false })))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

pub async fn promote(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
    Json(body): Json<RoleRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    if !principal.is_super_admin() && body.role != "admin" {
        return Err(ApiError::forbidden("only a super-admin may grant this role"));
    }
    cxc_admin::promote(&state.pool, target, &body.role).await?;
    state.authz.invalidate_permissions(target).await;
    Ok(ok(serde_json::json!({ "promoted": true })))
}

pub async fn demote(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
    Json(body): Json<RoleRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    if !principal.is_super_admin() {
        return Err(ApiError::forbidden("only a super-admin may revoke roles"));
    }
    cxc_admin::demote(&state.pool, target, &body.role).await?;
    state.authz.invalidate_permissions(target).await;
    Ok(ok(serde_json::json!({ "demoted": true })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let temp_password = cxc_admin::reset_password(&state.pool, target).await?;
    Ok(ok(serde_json::json!({ "temp_password": temp_password })))
}

pub async fn revoke_device(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(device_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    cxc_admin::revoke_device(&state.pool, device_id).await?;
    Ok(ok(serde_json::json!({ "revoked": true })))
}

pub async fn revoke_session(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(session_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    cxc_admin::revoke_session(&state.pool, session_id).await?;
    Ok(ok(serde_json::json!({ "revoked": true })))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct AdminUserDto {
    id: Uuid,
    email: String,
    points: i64,
    is_banned: bool,
    banned_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct ListUsersQuery {
    pub banned: Option<bool>,
    pub search: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(q): Query<ListUsersQuery>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let search = q.search.unwrap_or_default();
    let rows: Vec<AdminUserDto> = match q.banned {
        Some(banned) => {
            sqlx::query_as(
                r#"
                select id, email, points, is_banned, banned_at from users
                where is_banned = $1 and ($2 = '' or email ilike '%' || $2 || '%')
                order by created_at desc
                "#,
            )
            .bind(banned)
            .bind(&search)
            .fetch_all(&state.pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                select id, email, points, is_banned, banned_at from users
                where ($1 = '' or email ilike '%' || $1 || '%')
                order by created_at desc
                "#,
            )
            .bind(&search)
            .fetch_all(&state.pool)
            .await?
        }
    };
    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct AuditLogDto {
    id: Uuid,
    actor_user_id: Option<Uuid>,
    target_user_id: Option<Uuid>,
    action: String,
    reason: Option<String>,
    points_delta: Option<i64>,
    related_entity: Option<String>,
    created_at: DateTime<Utc>,
}

pub async fn user_logs(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let rows: Vec<AuditLogDto> = sqlx::query_as(
        r#"
        select id, actor_user_id, target_user_id, action, reason, points_delta,
               related_entity, created_at
        from audit_log
        where actor_user_id = $1 or target_user_id = $1
        order by created_at desc
        "#,
    )
    .bind(target)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct DeviceDto {
    id: Uuid,
    device_name: String,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

pub async fn user_devices(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let rows: Vec<DeviceDto> = sqlx::query_as(
        "select id, device_name, revoked_at, created_at from user_devices where user_id = $1 order by created_at desc",
    )
    .bind(target)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct SessionDto {
    id: Uuid,
    device_id: Uuid,
    revoked_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

pub async fn user_sessions(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(target): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let rows: Vec<SessionDto> = sqlx::query_as(
        "select id, device_id, revoked_at, created_at from refresh_tokens where user_id = $1 order by created_at desc",
    )
    .bind(target)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

pub async fn create_group(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<CreateGroupRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let (id,): (Uuid,) = sqlx::query_as("insert into groups (name) values ($1) returning id")
        .bind(&body.name)
        .fetch_one(&state.pool)
        .await?;
    Ok(created(serde_json::json!({ "id": id })))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct GroupDto {
    id: Uuid,
    name: String,
}

pub async fn get_group(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let row: Option<GroupDto> = sqlx::query_as("select id, name from groups where id = $1")
        .bind(group_id)
        .fetch_optional(&state.pool)
        .await?;
    let Some(row) = row else {
        return Err(ApiError::not_found(format!("group {group_id} not found")));
    };
    Ok(ok(row))
}

#[derive(Deserialize)]
pub struct RenameGroupRequest {
    pub name: String,
}

pub async fn rename_group(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<RenameGroupRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let row: Option<GroupDto> =
        sqlx::query_as("update groups set name = $2 where id = $1 returning id, name")
            .bind(group_id)
            .bind(&body.name)
            .fetch_optional(&state.pool)
            .await?;
    let Some(row) = row else {
        return Err(ApiError::not_found(format!("group {group_id} not found")));
    };
    Ok(ok(row))
}

pub async fn delete_group(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(group_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    sqlx::query("delete from groups where id = $1")
        .bind(group_id)
        .execute(&state.pool)
        .await?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

pub async fn list_groups(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let rows: Vec<GroupDto> = sqlx::query_as("select id, name from groups order by name")
        .fetch_all(&state.pool)
        .await?;
    Ok(ok(rows))
}

#[derive(Deserialize)]
pub struct GroupMembersRequest {
    pub add: Vec<Uuid>,
    pub remove: Vec<Uuid>,
}

pub async fn update_group_members(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(group_id): Path<Uuid>,
    Json(body): Json<GroupMembersRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let mut tx = state.pool.begin().await?;
    for user_id in &body.add {
        sqlx::query(
            "insert into group_members (group_id, user_id) values ($1, $2) on conflict do nothing",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }
    for user_id in &body.remove {
        sqlx::query("delete from group_members where group_id = $1 and user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(ok(serde_json::json!({ "added": body.add.len(), "removed": body.remove.len() })))
}

#[derive(Deserialize)]
pub struct UpdateOfferRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub points_cost: Option<i64>,
    pub is_active: Option<bool>,
}

pub async fn update_offer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(offer_id): Path<Uuid>,
    Json(body): Json<UpdateOfferRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    if let Some(cost) = body.points_cost {
        if cost <= 0 {
            return Err(ApiError::validation("points_cost must be positive"));
        }
    }
    let updated = sqlx::query(
        r#"
        update offers set
            title = coalesce($2, title),
            description = coalesce($3, description),
            points_cost = coalesce($4, points_cost),
            is_active = coalesce($5, is_active)
        where id = $1
        "#,
    )
    .bind(offer_id)
    .bind(body.title)
    .bind(body.description)
    .bind(body.points_cost)
    .bind(body.is_active)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found(format!("offer {offer_id} not found")));
    }
    Ok(ok(serde_json::json!({ "updated": true })))
}

pub async fn delete_offer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(offer_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    sqlx::query("update offers set is_active = false where id = $1")
        .bind(offer_id)
        .execute(&state.pool)
        .await?;
    Ok(ok(serde_json::json!({ "deactivated": true })))
}

pub async fn pending_resolution(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    #[derive(sqlx::FromRow, Serialize)]
    struct PendingBetDto {
        id: Uuid,
        title: String,
        closes_at: DateTime<Utc>,
        status: String,
    }
    let rows: Vec<PendingBetDto> = sqlx::query_as(
        "select id, title, closes_at, status from bets where status in ('closed', 'resolving') order by closes_at",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub result_option_id: Uuid,
}

pub async fn resolve_bet(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(bet_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ResolveRequest>,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;

    let request_body = serde_json::json!({ "result_option_id": body.result_option_id });
    let guard = match idempotency_guard::begin(
        &state.pool,
        &headers,
        principal.user_id,
        "POST /admin/bets/:id/resolve",
        "POST",
        &request_body,
    )
    .await?
    {
        IdemStart::Response(r) => return Ok(r),
        IdemStart::Fresh(g) => Some(g),
        IdemStart::NotRequested => None,
    };

    let outcome = cxc_bets::resolve(
        &state.pool,
        bet_id,
        body.result_option_id,
        principal.user_id,
        state.config.payout_max_attempts as i32,
    )
    .await?;

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            if let Some(guard) = guard {
                guard.release().await?;
            }
            return Err(e.into());
        }
    };

    state.payout_queue.push(outcome).await?;

    let payload = serde_json::json!({ "payout_job_id": outcome });
    if let Some(guard) = guard {
        guard.complete(200, &payload).await?;
    }
    Ok(ok(payload))
}

pub async fn cancel_bet(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(bet_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;

    let request_body = serde_json::json!({ "bet_id": bet_id });
    let guard = match idempotency_guard::begin(
        &state.pool,
        &headers,
        principal.user_id,
        "DELETE /admin/bets/:id",
        "DELETE",
        &request_body,
    )
    .await?
    {
        IdemStart::Response(r) => return Ok(r),
        IdemStart::Fresh(g) => Some(g),
        IdemStart::NotRequested => None,
    };

    let outcome = cxc_bets::cancel(&state.pool, bet_id).await?;
    if let Err(e) = outcome {
        if let Some(guard) = guard {
            guard.release().await?;
        }
        return Err(e.into());
    }

    let payload = serde_json::json!({ "cancelled": true });
    if let Some(guard) = guard {
        guard.complete(200, &payload).await?;
    }
    Ok(ok(payload))
}

pub async fn logs(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let rows: Vec<AuditLogDto> = sqlx::query_as(
        r#"
        select id, actor_user_id, target_user_id, action, reason, points_delta,
               related_entity, created_at
        from audit_log
        order by created_at desc
        limit 500
        "#,
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct FeeSummaryDto {
    total_fee_points: Option<i64>,
    fee_events: i64,
}

pub async fn fees_summary(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    require_admin(&principal)?;
    let row: FeeSummaryDto = sqlx::query_as(
        r#"
        select
            sum(points_delta) filter (where action in ('offer_accept_fee', 'bet_sell_fee', 'bet_payout_fee')) as total_fee_points,
            count(*) filter (where action in ('offer_accept_fee', 'bet_sell_fee', 'bet_payout_fee')) as fee_events
        from audit_log
        "#,
    )
    .fetch_one(&state.pool)
    .await?;
    Ok(ok(row))
}
