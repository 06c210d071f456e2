//! Bearer-token authentication for API routes.
//!
//! The gate verifies the access token on every request and binds its
//! subject for handlers. It never renews tokens itself; an expired token is
//! answered with the `token.expired` code and the client refreshes through
//! `POST /users/refresh`.

mod errors;
mod extractors;
mod header;
mod ip;
mod state;
mod types;

pub use errors::{AuthGateError, SERVER_CONFIG_CODE, TOKEN_EXPIRED_CODE, TOKEN_MISSING_CODE};
pub use extractors::{Auth, authenticate};
pub use header::{BearerToken, bearer_token};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasTokenIssuer;
pub use types::AuthenticatedUser;
