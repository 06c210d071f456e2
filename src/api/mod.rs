mod error;
mod schedules;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::TokenIssuer;
use crate::rate_limit::RateLimitConfig;

pub use error::{ApiError, TOKEN_INVALID_CODE};
pub use schedules::SchedulesState;
pub use users::{INVALID_CREDENTIALS, UsersState};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    issuer: Arc<TokenIssuer>,
    bcrypt_cost: u32,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let schedules_state = schedules::SchedulesState {
        db: db.clone(),
        issuer: issuer.clone(),
    };

    let users_state = users::UsersState {
        db,
        issuer,
        bcrypt_cost,
        rate_limit_config,
    };

    Router::new()
        .nest("/users", users::router(users_state))
        .nest("/schedules", schedules::router(schedules_state))
}
