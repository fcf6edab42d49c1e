use axum::extract::{Path, State};
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::envelope::ok;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(sqlx::FromRow, Serialize)]
pub struct PublicUserDto {
    id: Uuid,
    email: String,
    points: i64,
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let row: Option<PublicUserDto> =
        sqlx::query_as("select id, email, points from users where id = $1")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;
    let Some(row) = row else {
        return Err(ApiError::not_found(format!("user {user_id} not found")));
    };
    Ok(ok(row))
}

#[derive(sqlx::FromRow, Serialize)]
pub struct PublicProfileDto {
    id: Uuid,
    profile_description: Option<String>,
    profile_alias: Option<String>,
    profile_quote: Option<String>,
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let row: Option<(Uuid, Option<String>, Option<String>, Option<String>, String)> =
        sqlx::query_as(
            "select id, profile_description, profile_alias, profile_quote, profile_visibility from users where id = $1",
        )
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?;

    let Some((id, description, alias, quote, visibility)) = row else {
        return Err(ApiError::not_found(format!("user {user_id} not found")));
    };
    if visibility != "public" {
        return Err(ApiError::forbidden("this profile is private"));
    }

    Ok(ok(PublicProfileDto {
        id,
        profile_description: description,
        profile_alias: alias,
        profile_quote: quote,
    }))
}
