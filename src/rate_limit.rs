//! Rate limiting for credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default login attempts per minute per IP.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 10;

/// Default signups per minute per IP.
pub const DEFAULT_SIGNUP_PER_MINUTE: u32 = 3;

/// Bucket used when the client IP cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for `POST /users/auth`
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for `POST /users`
    pub signup: Arc<IpLimiter>,
    /// Key on `X-Forwarded-For` instead of the peer address
    pub trust_forwarded: bool,
}

impl RateLimitConfig {
    /// Create rate limiters allowing the given number of requests per minute.
    /// A zero rate is treated as one.
    pub fn new(login_per_minute: u32, signup_per_minute: u32, trust_forwarded: bool) -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(
                login_per_minute,
            )))),
            signup: Arc::new(RateLimiter::keyed(Quota::per_minute(non_zero(
                signup_per_minute,
            )))),
            trust_forwarded,
        }
    }

    fn client_key(&self, request: &Request) -> String {
        extract_client_ip(request, self.trust_forwarded).unwrap_or_else(|| {
            tracing::debug!("Client IP unavailable, using shared rate limit bucket");
            UNKNOWN_CLIENT.to_string()
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PER_MINUTE, DEFAULT_SIGNUP_PER_MINUTE, false)
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many authentication attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}

/// Middleware for rate limiting user creation.
pub async fn rate_limit_signup(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = config.client_key(&request);

    match config.signup.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many signup attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}
