//! User profile handlers

use crate::{
    ctx::Ctx,
    error::{ApiResponse, Result},
    extract::{self, Query},
    handlers::envelope,
    models::{UserProfile, UserWithRelationState},
    config::AppState,
};
use axum::{
    extract::State,
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, alias = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// GET /users/me
pub async fn me(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<UserProfile>>> {
    let profile = state.users.require(ctx.user_id()).await?;
    Ok(envelope(profile))
}

/// PUT /users/me - Create or refresh the caller's public profile
pub async fn update_me(
    State(state): State<AppState>,
    ctx: Ctx,
    extract::Json(req): extract::Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserProfile>>> {
    info!("PUT /users/me - {}", ctx.user_id());
    let profile = state
        .users
        .upsert(ctx.user_id(), &req.display_name, &req.email)
        .await?;
    Ok(envelope(profile))
}

/// GET /users/search?q=
pub async fn search(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(params): Query<SearchParams>,
) -> Result<Json<ApiResponse<Vec<UserWithRelationState>>>> {
    let hits = state.requests.search_users(ctx.user_id(), &params.q).await?;
    Ok(envelope(hits))
}
