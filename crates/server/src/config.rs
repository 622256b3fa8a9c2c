//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::channel::ChannelService;
use crate::conversations::ConversationAggregator;
use crate::relationships::RequestService;
use crate::users::UserDirectory;

/// Configuration for the Pairline server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Root data directory
    pub data_dir: PathBuf,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Maximum pooled SQLite connections
    pub max_connections: u32,
    /// Seconds between background pair repair passes (0 disables)
    pub repair_interval_secs: u64,
    /// Whether a rejected request may be sent again by the same user
    pub allow_request_after_rejection: bool,
    /// Maximum number of results returned by user search
    pub search_limit: u32,
    /// Maximum message length in characters
    pub max_message_chars: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = std::env::var("PAIRLINE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("pairline_data"));
        let port: u16 = env_or("PAIRLINE_PORT", 3001);

        Self {
            database_path: data_dir.join("pairline.sqlite"),
            data_dir,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            max_connections: env_or("PAIRLINE_MAX_CONNECTIONS", 8),
            repair_interval_secs: env_or("PAIRLINE_REPAIR_INTERVAL_SECS", 60),
            allow_request_after_rejection: env_or("PAIRLINE_ALLOW_REREQUEST", false),
            search_limit: env_or("PAIRLINE_SEARCH_LIMIT", 20),
            max_message_chars: env_or("PAIRLINE_MAX_MESSAGE_CHARS", 4000),
        }
    }
}

impl ServerConfig {
    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        let base = base_dir.into();
        config.database_path = base.join("pairline.sqlite");
        config.data_dir = base;
        config
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        if let Some(parent) = self.database_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub users: Arc<UserDirectory>,
    pub requests: Arc<RequestService>,
    pub channel: Arc<ChannelService>,
    pub conversations: Arc<ConversationAggregator>,
}
