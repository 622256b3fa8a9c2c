//! Conversation and message handlers
//!
//! `{reference}` is either the caller's edge id or the shared
//! relationship id. Clients poll these endpoints; there is no push.

use crate::{
    config::AppState,
    ctx::Ctx,
    error::{ApiResponse, Result},
    extract::{self, Path, Query},
    handlers::envelope,
    models::{ConversationView, Message},
};
use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "isSystem")]
    pub is_system: bool,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadParams {
    #[serde(default = "default_only_unread")]
    pub only_unread: bool,
}

fn default_only_unread() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct MarkReadResult {
    pub updated: u64,
}

/// GET /conversations
pub async fn list(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<Vec<ConversationView>>>> {
    let views = state.conversations.list_conversations(ctx.user_id()).await?;
    Ok(envelope(views))
}

/// GET /conversations/{reference}/messages
pub async fn list_messages(
    Path(reference): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<ApiResponse<Vec<Message>>>> {
    let messages = state
        .channel
        .list_messages(&reference, ctx.user_id())
        .await?;
    Ok(envelope(messages))
}

/// POST /conversations/{reference}/messages
pub async fn send_message(
    Path(reference): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
    extract::Json(req): extract::Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>)> {
    let message = state
        .channel
        .send_message(&reference, ctx.user_id(), &req.content, req.is_system)
        .await?;
    Ok((StatusCode::CREATED, envelope(message)))
}

/// PUT /conversations/{reference}/read?only_unread=
pub async fn mark_read(
    Path(reference): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
    Query(params): Query<MarkReadParams>,
) -> Result<Json<ApiResponse<MarkReadResult>>> {
    let updated = state
        .channel
        .mark_read(&reference, ctx.user_id(), params.only_unread)
        .await?;
    Ok(envelope(MarkReadResult { updated }))
}
