//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::db::is_unique_violation;
use crate::jwt::JwtError;

/// Code sent when a refresh token cannot be verified.
pub const TOKEN_INVALID_CODE: &str = "token.invalid";

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
    fn hash_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
    fn hash_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            error!("{}: {}", msg, e);
            ApiError::internal("Internal Server Error")
        })
    }
}

/// Error mapping for writes guarded by a UNIQUE constraint.
pub trait UniqueResultExt<T> {
    /// A constraint violation becomes `400 conflict`; any other failure is
    /// a database error logged under `msg`.
    fn unique_err(self, conflict: &str, msg: &str) -> Result<T, ApiError>;
}

impl<T> UniqueResultExt<T> for Result<T, sqlx::Error> {
    fn unique_err(self, conflict: &str, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::bad_request(conflict)
            } else {
                ApiError::db_error(msg, e)
            }
        })
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// Refresh token could not be verified; the client must log in again.
    InvalidToken,
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Database error".into())
    }

    /// Map a token error. A missing key stays a server error and is never
    /// reported as a bad token.
    pub fn token_error(context: &str, e: JwtError) -> Self {
        match e {
            JwtError::Invalid(_) | JwtError::WrongTokenType => Self::InvalidToken,
            JwtError::MissingKey => {
                error!("{}: {}", context, e);
                Self::Internal("Token signing key is not configured".into())
            }
            JwtError::Encoding(_) | JwtError::TimeError => {
                error!("{}: {}", context, e);
                Self::Internal("Failed to generate token".into())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, None, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, None, msg),
            ApiError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                Some(TOKEN_INVALID_CODE),
                "Refresh token invalid.".to_string(),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, None, msg),
        };
        (status, Json(ErrorResponse { code, message })).into_response()
    }
}

/// Validate a UUID string format.
pub fn validate_uuid(uuid: &str) -> Result<(), ApiError> {
    if uuid.is_empty() {
        return Err(ApiError::bad_request("UUID cannot be empty"));
    }
    if uuid.len() > 36 {
        return Err(ApiError::bad_request("UUID is too long"));
    }
    if uuid::Uuid::parse_str(uuid).is_err() {
        return Err(ApiError::bad_request("Invalid UUID format"));
    }
    Ok(())
}
