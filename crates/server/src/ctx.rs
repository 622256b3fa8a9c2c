//! Request-scoped caller
//!
//! [`mw_require_identity`](crate::auth::mw_require_identity) stores a
//! [`Ctx`] in the request extensions; handlers take it as an argument.

use crate::error::{Error, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

/// Id of the authenticated user making the request
#[derive(Clone, Debug)]
pub struct Ctx {
    user_id: String,
}

impl Ctx {
    pub fn new(user_id: String) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        // Only reachable when a route skipped the identity layer
        let Some(ctx) = parts.extensions.get::<Ctx>() else {
            error!("[Guard] {} {} has no caller context", parts.method, parts.uri.path());
            return Err(Error::Internal("Caller context missing".into()));
        };
        Ok(ctx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_ctx_from_extensions() {
        let (mut parts, _) = Request::builder()
            .uri("/conversations")
            .body(())
            .unwrap()
            .into_parts();

        assert!(matches!(
            Ctx::from_request_parts(&mut parts, &()).await,
            Err(Error::Internal(_))
        ));

        parts.extensions.insert(Ctx::new("alice".into()));
        let ctx = Ctx::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.user_id(), "alice");
    }
}
