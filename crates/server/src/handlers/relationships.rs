//! Relationship lifecycle handlers

use crate::{
    config::AppState,
    ctx::Ctx,
    error::{ApiResponse, Result},
    extract::{self, Path, Query},
    handlers::envelope,
    models::{IncomingRequest, RelationshipEdge},
};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    #[serde(default, alias = "targetId")]
    pub target_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Removed {
    pub removed: bool,
}

/// GET /relationships?state=
pub async fn list(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<RelationshipEdge>>>> {
    let edges = state
        .requests
        .list_relationships(ctx.user_id(), params.state.as_deref())
        .await?;
    Ok(envelope(edges))
}

/// GET /relationships/requests - Incoming pending requests
pub async fn list_incoming(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<Vec<IncomingRequest>>>> {
    let requests = state.requests.list_incoming_requests(ctx.user_id()).await?;
    Ok(envelope(requests))
}

/// POST /relationships/requests - Send a request
pub async fn send_request(
    State(state): State<AppState>,
    ctx: Ctx,
    extract::Json(req): extract::Json<TargetRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RelationshipEdge>>)> {
    info!("POST /relationships/requests - {} -> {}", ctx.user_id(), req.target_id);
    let edge = state
        .requests
        .send_request(ctx.user_id(), &req.target_id)
        .await?;
    Ok((StatusCode::CREATED, envelope(edge)))
}

/// PUT /relationships/requests/{edge_id}/accept
pub async fn accept(
    Path(edge_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<RelationshipEdge>>> {
    info!("PUT /relationships/requests/{}/accept", edge_id);
    let edge = state.requests.accept_request(&edge_id, ctx.user_id()).await?;
    Ok(envelope(edge))
}

/// PUT /relationships/requests/{edge_id}/reject
pub async fn reject(
    Path(edge_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<RelationshipEdge>>> {
    info!("PUT /relationships/requests/{}/reject", edge_id);
    let edge = state.requests.reject_request(&edge_id, ctx.user_id()).await?;
    Ok(envelope(edge))
}

/// DELETE /relationships/{edge_id}
pub async fn remove(
    Path(edge_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<Removed>>> {
    info!("DELETE /relationships/{}", edge_id);
    state
        .requests
        .remove_relationship(&edge_id, ctx.user_id())
        .await?;
    Ok(envelope(Removed { removed: true }))
}

/// POST /relationships/block
pub async fn block(
    State(state): State<AppState>,
    ctx: Ctx,
    extract::Json(req): extract::Json<TargetRequest>,
) -> Result<Json<ApiResponse<RelationshipEdge>>> {
    info!("POST /relationships/block - {} blocks {}", ctx.user_id(), req.target_id);
    let edge = state
        .requests
        .block_user(ctx.user_id(), &req.target_id)
        .await?;
    Ok(envelope(edge))
}
