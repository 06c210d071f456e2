//! Authentication user types.

/// Subject bound to a request by the auth gate.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// User UUID from the token subject
    pub user_id: String,
    /// Email claim
    pub email: String,
}
