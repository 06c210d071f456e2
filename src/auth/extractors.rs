//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, error};

use super::errors::AuthGateError;
use super::header::{BearerToken, bearer_token};
use super::state::HasTokenIssuer;
use super::types::AuthenticatedUser;
use crate::jwt::{JwtError, TokenIssuer};

/// Verify the request's bearer token and return the subject it carries.
///
/// Stateless: only the issuer's keys are read.
pub fn authenticate(
    parts: &Parts,
    issuer: &TokenIssuer,
) -> Result<AuthenticatedUser, AuthGateError> {
    let token = match bearer_token(&parts.headers) {
        BearerToken::Missing => return Err(AuthGateError::Missing),
        BearerToken::Malformed => {
            debug!("Malformed authorization header");
            return Err(AuthGateError::Expired);
        }
        BearerToken::Present(token) => token,
    };

    // Checked up front so a missing key is never mistaken for a bad token.
    if !issuer.is_configured() {
        error!("Token signing key is not configured");
        return Err(AuthGateError::Config);
    }

    match issuer.validate_access_token(token) {
        Ok(claims) => Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
        }),
        Err(JwtError::MissingKey) => Err(AuthGateError::Config),
        Err(e) => {
            debug!(error = %e, "Access token rejected");
            Err(AuthGateError::Expired)
        }
    }
}

/// Extractor for endpoints that require an access token.
/// Rejects with a JSON `{code, message}` body.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasTokenIssuer + Send + Sync,
{
    type Rejection = AuthGateError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state.issuer()).map(Auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/schedules");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_valid_token_binds_subject() {
        let issuer = TokenIssuer::new(b"gate-secret");
        let tokens = issuer.issue_tokens("user-7", "u7@example.com").unwrap();
        let parts = parts_with_auth(Some(format!("Bearer {}", tokens.access_token).as_str()));

        let user = authenticate(&parts, &issuer).unwrap();
        assert_eq!(user.user_id, "user-7");
        assert_eq!(user.email, "u7@example.com");
    }

    #[test]
    fn test_missing_header() {
        let issuer = TokenIssuer::new(b"gate-secret");
        let parts = parts_with_auth(None);

        assert_eq!(
            authenticate(&parts, &issuer).unwrap_err(),
            AuthGateError::Missing
        );
    }

    #[test]
    fn test_garbage_token_is_expired_signal() {
        let issuer = TokenIssuer::new(b"gate-secret");
        let parts = parts_with_auth(Some("Bearer not-a-jwt"));

        assert_eq!(
            authenticate(&parts, &issuer).unwrap_err(),
            AuthGateError::Expired
        );
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let issuer = TokenIssuer::new(b"gate-secret");
        let tokens = issuer.issue_tokens("user-7", "u7@example.com").unwrap();
        let parts = parts_with_auth(Some(format!("Bearer {}", tokens.refresh_token).as_str()));

        assert_eq!(
            authenticate(&parts, &issuer).unwrap_err(),
            AuthGateError::Expired
        );
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let issuer = TokenIssuer::from_secret(None);
        let parts = parts_with_auth(Some("Bearer anything"));

        assert_eq!(
            authenticate(&parts, &issuer).unwrap_err(),
            AuthGateError::Config
        );
    }
}
