//! Error taxonomy for the core (spec §7). Every public command returns
//! `Result<T, CoreError>`; the HTTP adapter is the only place that
//! translates a variant into a status code.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input")]
    InvalidInput(Vec<FieldError>),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("duplicate claim")]
    DuplicateClaim,

    #[error("self-claim forbidden")]
    SelfClaimForbidden,

    #[error("blocked by active claims: {0}")]
    ConflictWithActiveClaims(String),

    #[error("conflict")]
    Conflict,

    #[error("timeout")]
    Timeout,

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            Self::DuplicateClaim => "DUPLICATE_CLAIM",
            Self::SelfClaimForbidden => "SELF_CLAIM_FORBIDDEN",
            Self::ConflictWithActiveClaims(_) => "CONFLICT_WITH_ACTIVE_CLAIMS",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

/// Never classify a store error as `Internal` without inspecting it first —
/// unique-index violations on the active-set indexes must surface as
/// `Conflict`/`DuplicateClaim` so callers can retry or react, not as an
/// opaque 500.
impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return match db_err.constraint() {
                    Some("claims_active_user_idx") => Self::DuplicateClaim,
                    Some("claims_active_position_idx") => Self::Conflict,
                    _ => Self::Conflict,
                };
            }
        }
        Self::Internal(err.into())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
    fields: Option<&'a [FieldError]>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidStateTransition(_) => StatusCode::CONFLICT,
            Self::DuplicateClaim => StatusCode::CONFLICT,
            Self::SelfClaimForbidden => StatusCode::FORBIDDEN,
            Self::ConflictWithActiveClaims(_) => StatusCode::CONFLICT,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let Self::Internal(ref source) = self {
            tracing::error!(error = %source, "internal error");
        }

        let fields = match &self {
            Self::InvalidInput(fields) => Some(fields.as_slice()),
            _ => None,
        };

        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
            fields,
        };

        (status, Json(body)).into_response()
    }
}
