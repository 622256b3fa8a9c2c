//! Caller Identity
//!
//! Credentials are checked upstream by the identity provider, which
//! forwards the authenticated user id in the `x-user-id` header. This
//! module only turns that header into a [`Ctx`](crate::ctx::Ctx).

pub mod middleware;

pub use middleware::mw_require_identity;

/// Header carrying the authenticated caller id
pub const USER_ID_HEADER: &str = "x-user-id";
