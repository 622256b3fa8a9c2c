//! HTTP handlers
//!
//! Every handler answers with the `{success, data, error}` envelope and
//! takes the caller from [`Ctx`](crate::ctx::Ctx).

pub mod conversations;
pub mod relationships;
pub mod users;

use crate::error::ApiResponse;
use axum::Json;
use serde::Serialize;

// Re-export AppState from config
pub use crate::config::AppState;

pub(crate) fn envelope<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data))
}
