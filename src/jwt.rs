//! JWT token issuing and validation.
//!
//! Dual-token scheme: a short-lived access token authorizes individual
//! requests, a long-lived refresh token is only good for minting new access
//! tokens. Both are stateless and signed with the same HS256 secret.
//!
//! Refresh tokens are not rotated or invalidated on use; one stays valid for
//! its whole lifetime.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token (15 minutes)
    Access,
    /// Long-lived refresh token (7 days)
    Refresh,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// User email
    pub email: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user id)
    pub sub: String,
    /// User email, carried so renewed access tokens keep it
    pub email: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes. Used for both login and renewal.
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Signs and verifies access and refresh tokens.
///
/// An issuer may be built without a key. Every operation then fails with
/// [`JwtError::MissingKey`] before attempting to sign or verify anything.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Option<SigningKeys>,
}

/// The pair of tokens handed out at login.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenIssuer {
    /// Create an issuer signing with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            keys: Some(SigningKeys {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
            }),
        }
    }

    /// Create an issuer from an optional secret. `None` yields an issuer
    /// whose operations all report [`JwtError::MissingKey`].
    pub fn from_secret(secret: Option<&[u8]>) -> Self {
        match secret {
            Some(secret) => Self::new(secret),
            None => Self { keys: None },
        }
    }

    /// Whether a signing key is configured.
    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    fn keys(&self) -> Result<&SigningKeys, JwtError> {
        self.keys.as_ref().ok_or(JwtError::MissingKey)
    }

    /// Issue an access token and a refresh token for the same subject.
    pub fn issue_tokens(&self, subject: &str, email: &str) -> Result<IssuedTokens, JwtError> {
        let keys = self.keys()?;
        let now = unix_now()?;

        let access_token = sign_access(keys, subject, email, now)?;

        let refresh = RefreshClaims {
            sub: subject.to_string(),
            email: email.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + REFRESH_TOKEN_DURATION_SECS,
        };
        let refresh_token = jsonwebtoken::encode(&Header::default(), &refresh, &keys.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedTokens {
            access_token,
            refresh_token,
        })
    }

    /// Mint a new access token from a valid refresh token.
    ///
    /// Expired, malformed, foreign-signed and wrong-type tokens all collapse
    /// into [`JwtError::Invalid`].
    pub fn renew_access(&self, refresh_token: &str) -> Result<String, JwtError> {
        let keys = self.keys()?;
        let claims = self.validate_refresh_token(refresh_token)?;
        let now = unix_now()?;
        sign_access(keys, &claims.sub, &claims.email, now)
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let keys = self.keys()?;
        let token_data = jsonwebtoken::decode::<AccessClaims>(token, &keys.decoding, &validation())
            .map_err(JwtError::Invalid)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let keys = self.keys()?;
        let token_data =
            jsonwebtoken::decode::<RefreshClaims>(token, &keys.decoding, &validation())
                .map_err(JwtError::Invalid)?;

        if token_data.claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

fn sign_access(keys: &SigningKeys, subject: &str, email: &str, now: u64) -> Result<String, JwtError> {
    let claims = AccessClaims {
        sub: subject.to_string(),
        email: email.to_string(),
        token_type: TokenType::Access,
        iat: now,
        exp: now + ACCESS_TOKEN_DURATION_SECS,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding).map_err(JwtError::Encoding)
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// No signing key configured
    MissingKey,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Token failed verification (expired, malformed or bad signature)
    Invalid(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::MissingKey => write!(f, "No token signing key configured"),
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Invalid(e) => write!(f, "Invalid token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
