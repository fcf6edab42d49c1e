use axum::extract::State;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cxc_schemas::entities::ProfileVisibility;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(sqlx::FromRow, Serialize)]
pub struct MeDto {
    id: Uuid,
    email: String,
    points: i64,
    profile_description: Option<String>,
    profile_alias: Option<String>,
    profile_quote: Option<String>,
    profile_visibility: String,
}

pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let row: MeDto = sqlx::query_as(
        r#"
        select id, email, points, profile_description, profile_alias,
               profile_quote, profile_visibility
        from users where id = $1
        "#,
    )
    .bind(principal.user_id)
    .fetch_one(&state.pool)
    .await?;
    Ok(ok(row))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct StatsDto {
    points: i64,
    open_positions: i64,
    resolved_positions: i64,
}

pub async fn stats(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let row: StatsDto = sqlx::query_as(
        r#"
        select
            u.points as points,
            (select count(*) from bet_positions p where p.user_id = u.id and p.status = 'open') as open_positions,
            (select count(*) from bet_positions p where p.user_id = u.id and p.status != 'open') as resolved_positions
        from users u where u.id = $1
        "#,
    )
    .bind(principal.user_id)
    .fetch_one(&state.pool)
    .await?;
    Ok(ok(row))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct MyPositionDto {
    id: Uuid,
    bet_id: Uuid,
    bet_option_id: Uuid,
    stake_points: i64,
    odds_at_purchase_centi: i64,
    status: String,
    payout_points: Option<i64>,
    sold_points: Option<i64>,
}

pub async fn my_bets(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let rows: Vec<MyPositionDto> = sqlx::query_as(
        r#"
        select id, bet_id, bet_option_id, stake_points, odds_at_purchase_centi,
               status, payout_points, sold_points
        from bet_positions where user_id = $1
        order by created_at desc
        "#,
    )
    .bind(principal.user_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct MyGroupDto {
    id: Uuid,
    name: String,
}

pub async fn my_groups(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Response, ApiError> {
    let rows: Vec<MyGroupDto> = sqlx::query_as(
        r#"
        select g.id, g.name from groups g
        join group_members gm on gm.group_id = g.id
        where gm.user_id = $1
        order by g.name
        "#,
    )
    .bind(principal.user_id)
    .fetch_all(&state.pool)
    .await?;
    Ok(ok(rows))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub description: Option<String>,
    pub alias: Option<String>,
    pub quote: Option<String>,
    pub visibility: Option<ProfileVisibility>,
}

fn visibility_literal(v: ProfileVisibility) -> &'static str {
    match v {
        ProfileVisibility::Public => "public",
        ProfileVisibility::Private => "private",
    }
}

pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Response, ApiError> {
    let visibility = body.visibility.map(visibility_literal);

    let row: MeDto = sqlx::query_as(
        r#"
        update users set
            profile_description = coalesce($2, profile_description),
            profile_alias = coalesce($3, profile_alias),
            profile_quote = coalesce($4, profile_quote),
            profile_visibility = coalesce($5, profile_visibility)
        where id = $1
        returning id, email, points, profile_description, profile_alias,
                  profile_quote, profile_visibility
        "#,
    )
    .bind(principal.user_id)
    .bind(body.description)
    .bind(body.alias)
    .bind(body.quote)
    .bind(visibility)
    .fetch_one(&state.pool)
    .await?;

    Ok(ok(row))
}
