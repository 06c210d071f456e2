//! User endpoints.
//!
//! - POST `/` - Register
//! - PUT `/` - Update name and/or password (authenticated)
//! - POST `/auth` - Log in, returns access + refresh token and the profile
//! - POST `/refresh` - Exchange a refresh token for a new access token

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt, UniqueResultExt};
use crate::auth::Auth;
use crate::db::Database;
use crate::impl_has_token_issuer;
use crate::jwt::TokenIssuer;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_signup};

/// Message for unknown email or wrong password. Deliberately identical.
pub const INVALID_CREDENTIALS: &str = "User or password invalid.";

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub issuer: Arc<TokenIssuer>,
    pub bcrypt_cost: u32,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_token_issuer!(UsersState);

pub fn router(state: UsersState) -> Router {
    let limits = state.rate_limit_config.clone();

    Router::new()
        .route(
            "/",
            post(create_user)
                .layer(middleware::from_fn_with_state(
                    limits.clone(),
                    rate_limit_signup,
                ))
                .put(update_user),
        )
        .route(
            "/auth",
            post(login).layer(middleware::from_fn_with_state(limits, rate_limit_login)),
        )
        .route("/refresh", post(refresh))
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Serialize)]
struct CreateUserResponse {
    id: String,
    name: String,
    email: String,
}

async fn create_user(
    State(state): State<UsersState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    let email = payload.email.trim();

    if name.is_empty() {
        return Err(ApiError::bad_request("Name cannot be empty"));
    }

    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email"));
    }

    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let exists = state
        .db
        .users()
        .email_exists(email)
        .await
        .db_err("Failed to check email")?;

    if exists {
        return Err(ApiError::bad_request("User exists"));
    }

    let password_hash =
        bcrypt::hash(&payload.password, state.bcrypt_cost).hash_err("Failed to hash password")?;

    let uuid = uuid::Uuid::new_v4().to_string();
    state
        .db
        .users()
        .create(&uuid, name, email, &password_hash)
        .await
        .unique_err("User exists", "Failed to create user")?;

    info!(user = %uuid, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            id: uuid,
            name: name.to_string(),
            email: email.to_string(),
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct UserProfile {
    name: String,
    email: String,
    avatar_url: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    refresh_token: String,
    user: UserProfile,
}

async fn login(
    State(state): State<UsersState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_email(payload.email.trim())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::bad_request(INVALID_CREDENTIALS))?;

    let password_matches = match bcrypt::verify(&payload.password, &user.password_hash) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(user = %user.uuid, error = %e, "Stored password hash is unreadable");
            false
        }
    };

    if !password_matches {
        return Err(ApiError::bad_request(INVALID_CREDENTIALS));
    }

    let tokens = state
        .issuer
        .issue_tokens(&user.uuid, &user.email)
        .map_err(|e| ApiError::token_error("Failed to issue tokens", e))?;

    info!(user = %user.uuid, "User logged in");

    Ok(Json(LoginResponse {
        token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user: UserProfile {
            name: user.name,
            email: user.email,
            avatar_url: user.avatar_url,
        },
    }))
}

#[derive(Deserialize)]
struct RefreshRequest {
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct RefreshResponse {
    newtoken: String,
}

/// Mint a new access token. The refresh token itself is returned to no one
/// and stays valid until it expires.
async fn refresh(
    State(state): State<UsersState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let refresh_token = payload
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Refresh token missing"))?;

    let newtoken = state
        .issuer
        .renew_access(&refresh_token)
        .map_err(|e| ApiError::token_error("Failed to renew access token", e))?;

    Ok(Json(RefreshResponse { newtoken }))
}

#[derive(Deserialize)]
struct UpdateUserRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "oldPassword")]
    old_password: Option<String>,
    #[serde(default, rename = "newPassword")]
    new_password: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn update_user(
    State(state): State<UsersState>,
    Auth(auth): Auth,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(&auth.user_id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let (Some(old_password), Some(new_password)) = (&payload.old_password, &payload.new_password)
    {
        let old_matches = bcrypt::verify(old_password, &user.password_hash).unwrap_or(false);
        if !old_matches {
            return Err(ApiError::bad_request("Password invalid."));
        }

        if new_password.len() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::bad_request(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        let password_hash =
            bcrypt::hash(new_password, state.bcrypt_cost).hash_err("Failed to hash password")?;
        state
            .db
            .users()
            .update_password(user.id, &password_hash)
            .await
            .db_err("Failed to update password")?;
    }

    if let Some(name) = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        state
            .db
            .users()
            .update_name(user.id, name)
            .await
            .db_err("Failed to update name")?;
    }

    Ok(Json(MessageResponse {
        message: "User updated successfully",
    }))
}
