//! Authentication error types.
//!
//! Every rejection carries a machine-readable `code`. Clients key their
//! refresh behavior on [`TOKEN_EXPIRED_CODE`]; both 401 cases share the
//! same status, so the status alone is not enough.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Code sent when the access token is expired or otherwise unverifiable.
pub const TOKEN_EXPIRED_CODE: &str = "token.expired";

/// Code sent when no `Authorization` header was supplied.
pub const TOKEN_MISSING_CODE: &str = "token.missing";

/// Code sent when the server has no signing key.
pub const SERVER_CONFIG_CODE: &str = "server.config";

/// Rejections produced by the auth gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthGateError {
    /// No `Authorization` header.
    Missing,
    /// Token expired, malformed, wrongly signed or of the wrong type.
    Expired,
    /// No signing key configured. Never reported as an expired token.
    Config,
}

impl AuthGateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing => TOKEN_MISSING_CODE,
            Self::Expired => TOKEN_EXPIRED_CODE,
            Self::Config => SERVER_CONFIG_CODE,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Missing | Self::Expired => StatusCode::UNAUTHORIZED,
            Self::Config => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Missing => "Token missing",
            Self::Expired => "Token expired.",
            Self::Config => "Token signing key is not configured",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthGateError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                code: self.code(),
                message: self.message(),
            }),
        )
            .into_response()
    }
}
