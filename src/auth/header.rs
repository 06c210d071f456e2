//! Bearer token parsing for the `Authorization` header.

use axum::http::{HeaderMap, header};

/// Outcome of reading the `Authorization` header.
#[derive(Debug, PartialEq, Eq)]
pub enum BearerToken<'a> {
    /// No `Authorization` header at all.
    Missing,
    /// Header present but not a usable `Bearer <token>` value.
    Malformed,
    /// The raw token.
    Present(&'a str),
}

/// Extract the bearer token from the `Authorization` header.
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> BearerToken<'_> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return BearerToken::Missing;
    };
    let Ok(value) = value.to_str() else {
        return BearerToken::Malformed;
    };

    let Some((scheme, token)) = value.trim().split_once(' ') else {
        return BearerToken::Malformed;
    };
    if !scheme.eq_ignore_ascii_case("bearer") {
        return BearerToken::Malformed;
    }

    let token = token.trim();
    if token.is_empty() {
        BearerToken::Malformed
    } else {
        BearerToken::Present(token)
    }
}
