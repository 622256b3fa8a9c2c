//! Router
//!
//! Everything except the health check sits behind the identity middleware.

use crate::auth::mw_require_identity;
use crate::config::AppState;
use crate::handlers::{conversations, relationships, users};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Profiles
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/users/search", get(users::search))
        // Relationship lifecycle
        .route("/relationships", get(relationships::list))
        .route(
            "/relationships/requests",
            get(relationships::list_incoming).post(relationships::send_request),
        )
        .route(
            "/relationships/requests/{edge_id}/accept",
            put(relationships::accept),
        )
        .route(
            "/relationships/requests/{edge_id}/reject",
            put(relationships::reject),
        )
        .route("/relationships/block", post(relationships::block))
        .route("/relationships/{edge_id}", delete(relationships::remove))
        // Conversations
        .route("/conversations", get(conversations::list))
        .route(
            "/conversations/{reference}/messages",
            get(conversations::list_messages).post(conversations::send_message),
        )
        .route("/conversations/{reference}/read", put(conversations::mark_read))
        .route_layer(middleware::from_fn(mw_require_identity));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

async fn health_check() -> &'static str {
    "OK - Pairline Server"
}
