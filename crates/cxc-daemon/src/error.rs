//! The `{ok:false,code,message,issues?}` envelope every handler error maps
//! into, plus `From` impls from each domain crate's hand-rolled error enum.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    InsufficientPoints,
    StateInvalid,
    RateLimited,
    Internal,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InsufficientPoints => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StateInvalid => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub issues: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            issues: None,
        }
    }

    pub fn with_issues(mut self, issues: serde_json::Value) -> Self {
        self.issues = Some(issues);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    ok: bool,
    code: ErrorCode,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    issues: &'a Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let body = ErrorEnvelope {
            ok: false,
            code: self.code,
            message: &self.message,
            issues: &self.issues,
        };
        (status, Json(body)).into_response()
    }
}

/// `anyhow::Error` from any IO/orchestration failure (DB down, etc.) always
/// maps to `Internal` — the caller already logged the span via `TraceLayer`.
impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = %e, "internal error");
        ApiError::new(ErrorCode::Internal, "internal error")
    }
}

impl From<cxc_authz::AuthzError> for ApiError {
    fn from(e: cxc_authz::AuthzError) -> Self {
        use cxc_authz::AuthzError::*;
        match e {
            InvalidToken | Expired | NoPrimarySecret => {
                ApiError::unauthenticated("invalid or expired credentials")
            }
            UserNotFound { .. } => ApiError::unauthenticated("invalid or expired credentials"),
            Banned { .. } => ApiError::forbidden("account is banned"),
        }
    }
}

impl From<cxc_offers::OfferError> for ApiError {
    fn from(e: cxc_offers::OfferError) -> Self {
        use cxc_offers::OfferError::*;
        match e {
            NotFound { .. } => ApiError::not_found(e.to_string()),
            NotActive { .. } | CreatorCannotAcceptOwnOffer { .. } | CapReached { .. } => {
                ApiError::new(ErrorCode::StateInvalid, e.to_string())
            }
            GroupAccessDenied { .. } => ApiError::forbidden(e.to_string()),
            InsufficientPoints { .. } => ApiError::new(ErrorCode::InsufficientPoints, e.to_string()),
            DuplicateReview { .. } => ApiError::conflict(e.to_string()),
        }
    }
}

impl From<cxc_bets::BetError> for ApiError {
    fn from(e: cxc_bets::BetError) -> Self {
        use cxc_bets::BetError::*;
        match &e {
            NotFound { .. } | OptionNotFound { .. } | PositionNotFound { .. } => {
                ApiError::not_found(e.to_string())
            }
            BuyClosed { .. } | SellForbidden { .. } | TooFewOptions => {
                ApiError::validation(e.to_string())
            }
            PositionNotOpen { .. } | Transition(_) => {
                ApiError::new(ErrorCode::StateInvalid, e.to_string())
            }
            AlreadyResolved { .. } => ApiError::conflict(e.to_string()),
            GroupAccessDenied { .. } => ApiError::forbidden(e.to_string()),
            InsufficientPoints { .. } => ApiError::new(ErrorCode::InsufficientPoints, e.to_string()),
        }
    }
}

impl From<cxc_admin::AdminError> for ApiError {
    fn from(e: cxc_admin::AdminError) -> Self {
        use cxc_admin::AdminError::*;
        match e {
            UserNotFound { .. } => ApiError::not_found(e.to_string()),
            TargetIsProtected { .. } => ApiError::forbidden(e.to_string()),
            TargetAlreadyBanned { .. } => ApiError::conflict(e.to_string()),
            InsufficientPoints { .. } => ApiError::new(ErrorCode::InsufficientPoints, e.to_string()),
        }
    }
}

impl From<cxc_ledger::LedgerError> for ApiError {
    fn from(e: cxc_ledger::LedgerError) -> Self {
        use cxc_ledger::LedgerError::*;
        match e {
            InsufficientBalance { .. } => {
                ApiError::new(ErrorCode::InsufficientPoints, e.to_string())
            }
            NonPositiveAmount { .. } => ApiError::validation(e.to_string()),
            UnknownUser { .. } => ApiError::not_found(e.to_string()),
        }
    }
}
