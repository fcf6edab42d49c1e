//! Group visibility filter for offers and bets.
//!
//! A resource with no group attached is public; one scoped to a group is
//! visible only to that group's members (the creator included, since
//! creating inside a group implies membership elsewhere in the flow).

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn group_visible(pool: &PgPool, user_id: Uuid, group_id: Option<Uuid>) -> Result<bool> {
    let Some(group_id) = group_id else {
        return Ok(true);
    };

    let (is_member,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from group_members where group_id = $1 and user_id = $2
        )
        "#,
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("group_visible membership check")?;

    Ok(is_member)
}

/// The set of group ids `user_id` belongs to, used to build a list-query
/// filter (`group_id is null or group_id = any($groups)`) without an N+1
/// membership check per row.
pub async fn visible_group_ids(pool: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("select group_id from group_members where user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("visible_group_ids")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
