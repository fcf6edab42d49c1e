//! The success half of the `{ok:true,data}` / `{ok:false,...}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
struct OkEnvelope<T> {
    ok: bool,
    data: T,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(OkEnvelope { ok: true, data })).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(OkEnvelope { ok: true, data })).into_response()
}

pub fn status_json<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(OkEnvelope { ok: true, data })).into_response()
}
