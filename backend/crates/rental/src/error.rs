//! Rental Error Types
//!
//! This module provides rental-specific error variants that integrate
//! with the unified `kernel::error::AppError` system. Every variant carries
//! a stable machine code so clients can branch ("scan again" vs. "fine too high").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Rental-specific result type alias
pub type RentalResult<T> = Result<T, RentalError>;

/// Rental-specific error variants
#[derive(Debug, Error)]
pub enum RentalError {
    #[error("Cycle not found")]
    CycleNotFound,

    #[error("Student not found")]
    StudentNotFound,

    #[error("Rental not found")]
    RentalNotFound,

    #[error("Token not found")]
    TokenNotFound,

    /// Cycle is not `available`, or another offer is already pending for it
    #[error("Cycle is not available")]
    CycleNotAvailable,

    /// Cycle is no longer reserved by the token being redeemed
    #[error("Cycle is no longer reserved for this token")]
    CycleNotReserved,

    #[error("Student already has an open rental")]
    StudentHasOpenRental,

    #[error("Cycle already has an open rental")]
    CycleHasOpenRental,

    #[error("Rental already returned")]
    RentalAlreadyReturned,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token already claimed")]
    TokenAlreadyClaimed,

    #[error("Outstanding fine {outstanding} exceeds the limit of {ceiling}")]
    FineLimitExceeded { outstanding: i64, ceiling: i64 },

    /// Malformed QR code, token, or request payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid rental duration: {minutes} minutes (allowed 1..={max})")]
    InvalidDuration { minutes: u32, max: u32 },

    /// Caller role or identity does not permit the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Gateway did not forward a usable caller identity
    #[error("Caller identity required: {0}")]
    ActorRequired(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RentalError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        use RentalError::*;
        match self {
            CycleNotFound | StudentNotFound | RentalNotFound | TokenNotFound => {
                ErrorKind::NotFound
            }
            CycleNotAvailable
            | CycleNotReserved
            | StudentHasOpenRental
            | CycleHasOpenRental
            | RentalAlreadyReturned
            | TokenAlreadyClaimed => ErrorKind::Conflict,
            TokenExpired => ErrorKind::Gone,
            FineLimitExceeded { .. } => ErrorKind::UnprocessableEntity,
            InvalidPayload(_) | InvalidDuration { .. } => ErrorKind::BadRequest,
            Forbidden(_) => ErrorKind::Forbidden,
            ActorRequired(_) => ErrorKind::Unauthorized,
            Database(_) | Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        use RentalError::*;
        match self {
            CycleNotFound => "CYCLE_NOT_FOUND",
            StudentNotFound => "STUDENT_NOT_FOUND",
            RentalNotFound => "RENTAL_NOT_FOUND",
            TokenNotFound => "TOKEN_NOT_FOUND",
            CycleNotAvailable => "CYCLE_NOT_AVAILABLE",
            CycleNotReserved => "CYCLE_NOT_RESERVED",
            StudentHasOpenRental => "STUDENT_HAS_OPEN_RENTAL",
            CycleHasOpenRental => "CYCLE_HAS_OPEN_RENTAL",
            RentalAlreadyReturned => "RENTAL_ALREADY_RETURNED",
            TokenExpired => "TOKEN_EXPIRED",
            TokenAlreadyClaimed => "TOKEN_ALREADY_CLAIMED",
            FineLimitExceeded { .. } => "FINE_LIMIT_EXCEEDED",
            InvalidPayload(_) => "INVALID",
            InvalidDuration { .. } => "INVALID_DURATION",
            Forbidden(_) => "FORBIDDEN",
            ActorRequired(_) => "ACTOR_REQUIRED",
            Database(_) | Internal(_) => "INTERNAL",
        }
    }

    fn action(&self) -> Option<&'static str> {
        match self {
            RentalError::TokenExpired | RentalError::TokenAlreadyClaimed => {
                Some("Generate a new QR code and scan again")
            }
            RentalError::FineLimitExceeded { .. } => {
                Some("Settle outstanding fines before renting again")
            }
            _ => None,
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        // Storage details never leave the process
        let message = match self {
            RentalError::Database(_) | RentalError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };
        let err = AppError::new(self.kind(), message).with_code(self.code());
        match self.action() {
            Some(action) => err.with_action(action),
            None => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            RentalError::Database(e) => {
                tracing::error!(error = %e, "Rental database error");
            }
            RentalError::Internal(msg) => {
                tracing::error!(message = %msg, "Rental internal error");
            }
            RentalError::TokenAlreadyClaimed => {
                tracing::warn!("Replay of an already claimed token");
            }
            RentalError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "Rental action forbidden");
            }
            _ => {
                tracing::debug!(error = %self, code = self.code(), "Rental error");
            }
        }
    }
}

impl From<RentalError> for AppError {
    fn from(err: RentalError) -> Self {
        err.to_app_error()
    }
}

impl IntoResponse for RentalError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<platform::client::ActorError> for RentalError {
    fn from(err: platform::client::ActorError) -> Self {
        RentalError::ActorRequired(err.to_string())
    }
}
