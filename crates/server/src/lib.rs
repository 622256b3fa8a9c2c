//! Pairline Server Library
//!
//! Mutual-consent relationships between users, and the direct message
//! channel they unlock.

pub mod auth;
pub mod channel;
pub mod config;
pub mod conversations;
pub mod ctx;
pub mod error;
pub mod extract;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod relationships;
pub mod router;
pub mod store;
pub mod users;

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use channel::ChannelService;
use config::{AppState, ServerConfig};
use conversations::ConversationAggregator;
use guard::AuthorizationGuard;
use relationships::{spawn_repair_task, RequestPolicy, RequestService};
use store::SqliteStore;
use users::UserDirectory;

pub use router::router;

/// Open storage and wire every service for `config`
pub async fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    config.ensure_dirs().await?;

    let store = Arc::new(SqliteStore::open(&config.database_path, config.max_connections).await?);

    let users = Arc::new(UserDirectory::new(store.clone()));
    let requests = Arc::new(RequestService::new(
        store.clone(),
        users.clone(),
        RequestPolicy {
            allow_request_after_rejection: config.allow_request_after_rejection,
            search_limit: config.search_limit,
        },
    ));
    let guard = Arc::new(AuthorizationGuard::new(store.clone()));
    let channel = Arc::new(ChannelService::new(
        guard,
        store.clone(),
        config.max_message_chars,
    ));
    let conversations = Arc::new(ConversationAggregator::new(
        store.clone(),
        store.clone(),
        users.clone(),
    ));

    Ok(AppState {
        config,
        users,
        requests,
        channel,
        conversations,
    })
}

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        // Already set, ignore
    }

    info!("=== Pairline Server ===");

    let config = ServerConfig::default();
    info!("Data directory: {:?}", config.data_dir);
    info!("Database: {:?}", config.database_path);

    let state = build_state(config.clone()).await?;

    let repair = if config.repair_interval_secs > 0 {
        info!(
            "[Repair] Background pass every {}s",
            config.repair_interval_secs
        );
        Some(spawn_repair_task(
            state.requests.clone(),
            Duration::from_secs(config.repair_interval_secs),
        ))
    } else {
        warn!("[Repair] Background pass disabled");
        None
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = repair {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
