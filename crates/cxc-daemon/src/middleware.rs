//! Request-id propagation and the bearer-token auth extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue};
use cxc_authz::AuthenticatedPrincipal;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Generates a request id when absent and echoes it on every response;
/// wired as a `tower::Layer` via `SetRequestIdLayer`/`PropagateRequestIdLayer`
/// equivalents in `main.rs`, or applied inline here for handlers that need
/// the id (e.g. to stamp the `AuditEntry.correlation_id`).
pub fn extract_or_generate_request_id(parts: &Parts) -> Uuid {
    parts
        .headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

pub fn request_id_header_value(id: Uuid) -> HeaderValue {
    HeaderValue::from_str(&id.to_string()).expect("uuid is always a valid header value")
}

/// Axum extractor: parses `Authorization: Bearer <jwt>`, verifies it via
/// `Authz`, and yields the resolved principal. Any failure maps straight to
/// the `{ok:false,...}` envelope so handlers never see a partially-built one.
pub struct AuthUser(pub AuthenticatedPrincipal);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthenticated("missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthenticated("Authorization header is not a bearer token"))?;

        let principal = state.authz.authenticate(token).await?;
        Ok(AuthUser(principal))
    }
}
