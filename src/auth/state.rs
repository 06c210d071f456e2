//! Authentication state trait and macro.

use crate::jwt::TokenIssuer;

/// Trait for state types that can verify access tokens.
pub trait HasTokenIssuer {
    fn issuer(&self) -> &TokenIssuer;
}

/// Macro to implement `HasTokenIssuer` for state structs with the standard field.
///
/// The struct must have an `issuer: Arc<TokenIssuer>` field.
///
/// # Example
/// ```ignore
/// use crate::impl_has_token_issuer;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub issuer: Arc<TokenIssuer>,
/// }
///
/// impl_has_token_issuer!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_token_issuer {
    ($state_type:ty) => {
        impl $crate::auth::HasTokenIssuer for $state_type {
            fn issuer(&self) -> &$crate::jwt::TokenIssuer {
                &self.issuer
            }
        }
    };
}
