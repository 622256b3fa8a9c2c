use crate::auth::USER_ID_HEADER;
use crate::ctx::Ctx;
use crate::error::{Error, Result};
use crate::models::validate_id;
use axum::{extract::Request, middleware::Next, response::Response};
use tracing::debug;

pub async fn mw_require_identity(mut req: Request, next: Next) -> Result<Response> {
    debug!("MIDDLEWARE: require_identity");

    let user_id = match req.headers().get(USER_ID_HEADER) {
        Some(h) => h.to_str().map_err(|_| Error::Unauthenticated)?.trim(),
        None => return Err(Error::Unauthenticated),
    };
    validate_id("user id", user_id).map_err(|_| Error::Unauthenticated)?;

    let ctx = Ctx::new(user_id.to_string());
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}
