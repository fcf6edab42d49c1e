use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cxc_schemas::{OddsCenti, Points};

use crate::envelope::{created, ok};
use crate::error::ApiError;
use crate::idempotency_guard::{self, IdemStart};
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct NewBetOption {
    pub label: String,
    pub numeric_value: Option<f64>,
    pub odds: f64,
}

#[derive(Deserialize)]
pub struct CreateBetRequest {
    pub group_id: Option<Uuid>,
    pub title: String,
    pub bet_type: String,
    pub closes_at: DateTime<Utc>,
    pub options: Vec<NewBetOption>,
}

fn bet_type_literal(s: &str) -> Result<&'static str, ApiError> {
    match s {
        "boolean" => Ok("boolean"),
        "number" => Ok("number"),
        "multiple" => Ok("multiple"),
        _ => Err(ApiError::validation("bet_type must be boolean, number, or multiple")),
    }
}

pub async fn create_bet(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<CreateBetRequest>,
) -> Result<Response, ApiError> {
    if body.closes_at <= Utc::now() {
        return Err(ApiError::validation("closes_at must be strictly in the future"));
    }
    let bet_type = bet_type_literal(&body.bet_type)?;

    let mut options = Vec::with_capacity(body.options.len());
    for o in body.options {
        let odds = OddsCenti::from_f64(o.odds)
            .ok_or_else(|| ApiError::validation("odds must be >= 1.01"))?;
        options.push((o.label, o.numeric_value, odds));
    }

    let id = cxc_bets::create_bet(
        &state.pool,
        cxc_bets::NewBet {
            creator_user_id: principal.user_id,
            group_id: body.group_id,
            title: body.title,
            bet_type,
            closes_at: body.closes_at,
            options,
        },
    )
    .await??;

    Ok(created(serde_json::json!({ "id": id })))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct BetDto {
    id: Uuid,
    creator_user_id: Uuid,
    group_id: Option<Uuid>,
    title: String,
    bet_type: String,
    closes_at: DateTime<Utc>,
    status: String,
    result_option_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct ListBetsQuery {
    pub active: Option<bool>,
}

pub async fn list_bets(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(q): Query<ListBetsQuery>,
) -> Result<Response, ApiError> {
    let group_ids = cxc_access::visible_group_ids(&state.pool, principal.user_id).await?;
    let active_only = q.active.unwrap_or(false);

    let rows: Vec<BetDto> = sqlx::query_as(
        r#"
        select id, creator_user_id, group_id, title, bet_type, closes_at, status, result_option_id
        from bets
        where (group_id is null or group_id = any($1))
          and ($2 = false or status = 'open')
        order by created_at desc
        "#,
    )
    .bind(&group_ids)
    .bind(active_only)
    .fetch_all(&state.pool)
    .await?;

    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct BetOptionDto {
    id: Uuid,
    bet_id: Uuid,
    label: String,
    numeric_value: Option<f64>,
    current_odds_centi: i64,
}

pub async fn get_bet(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(bet_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let bet: Option<BetDto> = sqlx::query_as(
        "select id, creator_user_id, group_id, title, bet_type, closes_at, status, result_option_id from bets where id = $1",
    )
    .bind(bet_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(bet) = bet else {
        return Err(ApiError::not_found(format!("bet {bet_id} not found")));
    };
    if !cxc_access::group_visible(&state.pool, principal.user_id, bet.group_id).await? {
        return Err(ApiError::forbidden("bet not visible to this user's groups"));
    }

    let options: Vec<BetOptionDto> = sqlx::query_as(
        "select id, bet_id, label, numeric_value, current_odds_centi from bet_options where bet_id = $1",
    )
    .bind(bet_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(ok(serde_json::json!({ "bet": bet, "options": options })))
}

#[derive(Deserialize)]
pub struct BuyRequest {
    pub option_id: Uuid,
    pub stake: i64,
}

pub async fn buy(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(bet_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<BuyRequest>,
) -> Result<Response, ApiError> {
    if body.stake <= 0 {
        return Err(ApiError::validation("stake must be positive"));
    }

    let request_body = serde_json::json!({ "option_id": body.option_id, "stake": body.stake });
    let guard = match idempotency_guard::begin(
        &state.pool,
        &headers,
        principal.user_id,
        "POST /bets/:id/buy",
        "POST",
        &request_body,
    )
    .await?
    {
        IdemStart::Response(r) => return Ok(r),
        IdemStart::Fresh(g) => Some(g),
        IdemStart::NotRequested => None,
    };

    let outcome = cxc_bets::buy(
        &state.pool,
        bet_id,
        body.option_id,
        principal.user_id,
        Points::new(body.stake),
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

    let payload = serde_json::json!({
        "position_id": outcome.position_id,
        "odds_at_purchase": outcome.odds_at_purchase.to_f64(),
    });

    if let Some(guard) = guard {
        guard.complete(200, &payload).await?;
    }
    Ok(ok(payload))
}

#[derive(Deserialize)]
pub struct SellRequest {
    pub position_id: Uuid,
}

pub async fn sell(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(bet_id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<SellRequest>,
) -> Result<Response, ApiError> {
    let request_body = serde_json::json!({ "position_id": body.position_id });
    let guard = match idempotency_guard::begin(
        &state.pool,
        &headers,
        principal.user_id,
        "POST /bets/:id/sell",
        "POST",
        &request_body,
    )
    .await?
    {
        IdemStart::Response(r) => return Ok(r),
        IdemStart::Fresh(g) => Some(g),
        IdemStart::NotRequested => None,
    };

    let outcome = cxc_bets::sell(
        &state.pool,
        &state.super_admin,
        bet_id,
        body.position_id,
        principal.user_id,
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

    let payload = serde_json::json!({ "net": outcome.net.raw(), "fee": outcome.fee.raw() });

    if let Some(guard) = guard {
        guard.complete(200, &payload).await?;
    }
    Ok(ok(payload))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct PositionDto {
    id: Uuid,
    bet_id: Uuid,
    bet_option_id: Uuid,
    user_id: Uuid,
    stake_points: i64,
    odds_at_purchase_centi: i64,
    status: String,
    payout_points: Option<i64>,
    sold_points: Option<i64>,
}

pub async fn list_positions(
    State(state): State<AppState>,
    Path(bet_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let rows: Vec<PositionDto> = sqlx::query_as(
        r#"
        select id, bet_id, bet_option_id, user_id, stake_points, odds_at_purchase_centi,
               status, payout_points, sold_points
        from bet_positions where bet_id = $1
        order by created_at desc
        "#,
    )
    .bind(bet_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}
