//! Wraps a mutating handler's body in the idempotency-key contract: the
//! `Idempotency-Key` header is optional per-request, but once present it
//! must dedupe exactly as `cxc-idempotency` describes.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
const MAX_KEY_LEN: usize = 128;

pub enum IdemStart {
    /// Proceed with the handler; call `.complete()` on the returned guard
    /// with the final status/body once it's known.
    Fresh(IdemGuard),
    /// No `Idempotency-Key` header was supplied — proceed without recording.
    NotRequested,
    /// Short-circuit: return this response directly (replay or conflict).
    Response(Response),
}

pub struct IdemGuard {
    pool: PgPool,
    key: String,
    user_id: Uuid,
    route: &'static str,
    method: &'static str,
}

impl IdemGuard {
    pub async fn complete(self, status: u16, body: &Value) -> Result<(), ApiError> {
        cxc_idempotency::complete(
            &self.pool,
            &self.key,
            self.user_id,
            self.route,
            self.method,
            status as i32,
            body,
        )
        .await?;
        Ok(())
    }

    pub async fn release(self) -> Result<(), ApiError> {
        cxc_idempotency::release(&self.pool, &self.key, self.user_id, self.route, self.method)
            .await?;
        Ok(())
    }
}

pub async fn begin(
    pool: &PgPool,
    headers: &HeaderMap,
    user_id: Uuid,
    route: &'static str,
    method: &'static str,
    body: &Value,
) -> Result<IdemStart, ApiError> {
    let Some(key) = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(IdemStart::NotRequested);
    };

    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(ApiError::validation("Idempotency-Key must be 1-128 characters"));
    }

    let request_hash = cxc_idempotency::hash_request_body(body);
    let outcome = cxc_idempotency::begin(pool, key, user_id, route, method, &request_hash).await?;

    match outcome {
        cxc_idempotency::Begin::Fresh => Ok(IdemStart::Fresh(IdemGuard {
            pool: pool.clone(),
            key: key.to_string(),
            user_id,
            route,
            method,
        })),
        cxc_idempotency::Begin::Replay { status, body } => {
            let status = axum::http::StatusCode::from_u16(status as u16)
                .unwrap_or(axum::http::StatusCode::OK);
            Ok(IdemStart::Response((status, Json(body)).into_response()))
        }
        cxc_idempotency::Begin::InProgress => Ok(IdemStart::Response(
            ApiError::conflict("a request with this idempotency key is still in flight")
                .into_response(),
        )),
        cxc_idempotency::Begin::Conflict => Ok(IdemStart::Response(
            ApiError::conflict("idempotency key reused with a different request body")
                .into_response(),
        )),
    }
}
