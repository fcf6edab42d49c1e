//! Idempotency-key enforcement for balance-mutating HTTP routes.
//!
//! Keyed on `(idem_key, user_id, route, method)`, matching the outbox
//! dedupe idiom of `insert ... on conflict do nothing returning` to detect
//! "have we seen this key before" in one round trip. A request body hash is
//! stored alongside the key so a client that reuses a key with a *different*
//! body is rejected instead of silently replaying the wrong response.

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

/// Outcome of starting a request under an idempotency key.
pub enum Begin {
    /// No prior record: caller should execute the handler and call
    /// [`complete`] with the result.
    Fresh,
    /// A completed record exists for this exact (key, route, method, body
    /// hash): caller should return the stored response unchanged.
    Replay { status: i32, body: Value },
    /// A record exists but its handler hasn't completed yet — almost always
    /// a client retrying before the first attempt returned. Caller should
    /// reject with 409 rather than run the handler twice concurrently.
    InProgress,
    /// A record exists for this key but with a different request body.
    /// Reusing an idempotency key across different request bodies is a
    /// client bug.
    Conflict,
}

pub fn hash_request_body(body: &Value) -> String {
    let canonical = serde_json::to_vec(body).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex::encode(digest)
}

/// Attempt to claim `idem_key` for this `(user_id, route, method)`. Must be
/// called before the handler runs any balance-mutating work.
pub async fn begin(
    pool: &PgPool,
    idem_key: &str,
    user_id: uuid::Uuid,
    route: &str,
    method: &str,
    request_hash: &str,
) -> Result<Begin> {
    let claimed: Option<(String,)> = sqlx::query_as(
        r#"
        insert into idempotency_keys (idem_key, user_id, route, method, request_hash, status)
        values ($1, $2, $3, $4, $5, 'processing')
        on conflict (idem_key, user_id, route, method) do nothing
        returning status
        "#,
    )
    .bind(idem_key)
    .bind(user_id)
    .bind(route)
    .bind(method)
    .bind(request_hash)
    .fetch_optional(pool)
    .await
    .context("idempotency begin insert")?;

    if claimed.is_some() {
        return Ok(Begin::Fresh);
    }

    let existing: Option<(String, String, Option<i32>, Option<Value>)> = sqlx::query_as(
        r#"
        select request_hash, status, response_status, response_body
        from idempotency_keys
        where idem_key = $1 and user_id = $2 and route = $3 and method = $4
        "#,
    )
    .bind(idem_key)
    .bind(user_id)
    .bind(route)
    .bind(method)
    .fetch_optional(pool)
    .await
    .context("idempotency begin lookup")?;

    let Some((stored_hash, status, response_status, response_body)) = existing else {
        // Row vanished between the failed insert and this lookup — treat as
        // fresh, the race is harmless since the next insert will succeed.
        return Ok(Begin::Fresh);
    };

    if stored_hash != request_hash {
        return Ok(Begin::Conflict);
    }

    match status.as_str() {
        "completed" => {
            let status = response_status.unwrap_or(200);
            let body = response_body.unwrap_or(Value::Null);
            Ok(Begin::Replay { status, body })
        }
        _ => Ok(Begin::InProgress),
    }
}

/// Record the handler's outcome so future replays of this key return the
/// same response instead of re-running the handler.
pub async fn complete(
    pool: &PgPool,
    idem_key: &str,
    user_id: uuid::Uuid,
    route: &str,
    method: &str,
    response_status: i32,
    response_body: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update idempotency_keys
        set status = 'completed',
            response_status = $5,
            response_body = $6,
            completed_at = now()
        where idem_key = $1 and user_id = $2 and route = $3 and method = $4
        "#,
    )
    .bind(idem_key)
    .bind(user_id)
    .bind(route)
    .bind(method)
    .bind(response_status)
    .bind(response_body)
    .execute(pool)
    .await
    .context("idempotency complete update")?;
    Ok(())
}

/// Release a claimed-but-failed key so the client's retry with the same
/// body and key is treated as fresh rather than stuck `InProgress` forever.
pub async fn release(
    pool: &PgPool,
    idem_key: &str,
    user_id: uuid::Uuid,
    route: &str,
    method: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        delete from idempotency_keys
        where idem_key = $1 and user_id = $2 and route = $3 and method = $4 and status = 'processing'
        "#,
    )
    .bind(idem_key)
    .bind(user_id)
    .bind(route)
    .bind(method)
    .execute(pool)
    .await
    .context("idempotency release delete")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_body_hashes_identically_regardless_of_key_order() {
        let a = serde_json::json!({"amount": 5, "reason": "x"});
        let b = serde_json::json!({"reason": "x", "amount": 5});
        assert_eq!(hash_request_body(&a), hash_request_body(&b));
    }

    #[test]
    fn different_body_hashes_differ() {
        let a = serde_json::json!({"amount": 5});
        let b = serde_json::json!({"amount": 6});
        assert_ne!(hash_request_body(&a), hash_request_body(&b));
    }
}
