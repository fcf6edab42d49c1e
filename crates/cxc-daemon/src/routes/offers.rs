use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cxc_schemas::Points;

use crate::envelope::{created, ok};
use crate::error::ApiError;
use crate::idempotency_guard::{self, IdemStart};
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateOfferRequest {
    pub group_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub points_cost: i64,
    pub max_acceptances: Option<i32>,
}

pub async fn create_offer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<CreateOfferRequest>,
) -> Result<Response, ApiError> {
    if body.points_cost <= 0 {
        return Err(ApiError::validation("points_cost must be positive"));
    }
    let id = cxc_offers::create_offer(
        &state.pool,
        cxc_offers::NewOffer {
            creator_user_id: principal.user_id,
            group_id: body.group_id,
            title: body.title,
            description: body.description,
            points_cost: Points::new(body.points_cost),
            max_acceptances: body.max_acceptances,
        },
    )
    .await?;
    Ok(created(serde_json::json!({ "id": id })))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct OfferDto {
    id: Uuid,
    creator_user_id: Uuid,
    group_id: Option<Uuid>,
    title: String,
    description: String,
    points_cost: i64,
    max_acceptances: Option<i32>,
    accepted_count: i32,
    is_active: bool,
}

#[derive(Deserialize)]
pub struct ListOffersQuery {
    pub active: Option<bool>,
    pub search: Option<String>,
}

pub async fn list_offers(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Query(q): Query<ListOffersQuery>,
) -> Result<Response, ApiError> {
    let group_ids = cxc_access::visible_group_ids(&state.pool, principal.user_id).await?;
    let active_filter = q.active.unwrap_or(true);
    let search = q.search.unwrap_or_default();

    let rows: Vec<OfferDto> = sqlx::query_as(
        r#"
        select id, creator_user_id, group_id, title, description, points_cost,
               max_acceptances, accepted_count, is_active
        from offers
        where (group_id is null or group_id = any($1))
          and ($2 = false or is_active = true)
          and ($3 = '' or title ilike '%' || $3 || '%')
        order by created_at desc
        "#,
    )
    .bind(&group_ids)
    .bind(active_filter)
    .bind(&search)
    .fetch_all(&state.pool)
    .await?;

    Ok(ok(rows))
}

pub async fn get_offer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(offer_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let row: Option<OfferDto> = sqlx::query_as(
        r#"
        select id, creator_user_id, group_id, title, description, points_cost,
               max_acceptances, accepted_count, is_active
        from offers where id = $1
        "#,
    )
    .bind(offer_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(row) = row else {
        return Err(ApiError::not_found(format!("offer {offer_id} not found")));
    };
    if !cxc_access::group_visible(&state.pool, principal.user_id, row.group_id).await? {
        return Err(ApiError::forbidden("offer not visible to this user's groups"));
    }
    Ok(ok(row))
}

pub async fn accept_offer(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(offer_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let body = serde_json::json!({ "offer_id": offer_id });
    let guard = match idempotency_guard::begin(
        &state.pool,
        &headers,
        principal.user_id,
        "POST /offers/:id/accept",
        "POST",
        &body,
    )
    .await?
    {
        IdemStart::Response(r) => return Ok(r),
        IdemStart::Fresh(g) => Some(g),
        IdemStart::NotRequested => None,
    };

    let outcome = cxc_offers::accept_offer(
        &state.pool,
        &state.super_admin,
        offer_id,
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

    let payload = serde_json::json!({
        "acceptance_id": outcome.acceptance_id,
        "fee": outcome.fee.raw(),
        "total_charged": outcome.total_charged.raw(),
    });

    if let Some(guard) = guard {
        guard.complete(200, &payload).await?;
    }

    Ok(ok(payload))
}

#[derive(Deserialize)]
pub struct SubmitReviewRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

pub async fn submit_review(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(offer_id): Path<Uuid>,
    Json(body): Json<SubmitReviewRequest>,
) -> Result<Response, ApiError> {
    if !(1..=5).contains(&body.rating) {
        return Err(ApiError::validation("rating must be between 1 and 5"));
    }
    let id = cxc_offers::submit_review(
        &state.pool,
        offer_id,
        principal.user_id,
        body.rating,
        body.comment,
    )
    .await??;
    Ok(created(serde_json::json!({ "id": id })))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct ReviewDto {
    id: Uuid,
    offer_id: Uuid,
    reviewer_user_id: Uuid,
    rating: i16,
    comment: Option<String>,
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(offer_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let rows: Vec<ReviewDto> = sqlx::query_as(
        "select id, offer_id, reviewer_user_id, rating, comment from offer_reviews where offer_id = $1 order by created_at desc",
    )
    .bind(offer_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct AcceptanceDto {
    id: Uuid,
    offer_id: Uuid,
    buyer_user_id: Uuid,
    fee_points: i64,
}

pub async fn list_acceptances(
    State(state): State<AppState>,
    Path(offer_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let rows: Vec<AcceptanceDto> = sqlx::query_as(
        "select id, offer_id, buyer_user_id, fee_points from offer_acceptances where offer_id = $1 order by created_at desc",
    )
    .bind(offer_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}
