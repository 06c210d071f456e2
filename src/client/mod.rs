//! Client library for the slotbook API.
//!
//! [`SessionGuard`] sits between callers and the HTTP [`Transport`]. It
//! attaches the stored access token to each request and, when the server
//! answers `token.expired`, renews the token through a single refresh call
//! shared by every request that hit the expiry, then replays them.

mod api;
mod error;
mod guard;
mod session;
mod transport;

pub use api::{ApiClient, BOOKABLE_HOURS, ProfileUpdate, RegisteredUser, ScheduleEntry, available_hours};
pub use error::{ClientError, RefreshError, TransportError};
pub use guard::{REFRESH_PATH, SessionGuard};
pub use session::{
    FileSessionStore, MemorySessionStore, REFRESH_TOKEN_KEY, SessionStore, TOKEN_KEY, USER_KEY,
    UserProfile,
};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
