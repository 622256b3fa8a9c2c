//! Direct message channel
//!
//! Send, list and mark-read between the two members of an active pair.
//! Every call resolves the relationship reference through the
//! [`AuthorizationGuard`] before touching messages.

use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::guard::AuthorizationGuard;
use crate::models::Message;
use crate::store::MessageStore;

pub struct ChannelService {
    guard: Arc<AuthorizationGuard>,
    messages: Arc<dyn MessageStore>,
    max_message_chars: usize,
}

impl ChannelService {
    pub fn new(
        guard: Arc<AuthorizationGuard>,
        messages: Arc<dyn MessageStore>,
        max_message_chars: usize,
    ) -> Self {
        Self {
            guard,
            messages,
            max_message_chars,
        }
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(Error::Validation(
                "Message content must not be empty".into(),
            ));
        }
        if content.chars().count() > self.max_message_chars {
            return Err(Error::Validation(format!(
                "Message exceeds {} characters",
                self.max_message_chars
            )));
        }
        Ok(())
    }

    /// Send `content` to the peer. `is_system` marks automated messages
    /// posted on the caller's behalf; it carries no extra meaning here.
    pub async fn send_message(
        &self,
        reference: &str,
        caller_id: &str,
        content: &str,
        is_system: bool,
    ) -> Result<Message> {
        self.validate_content(content)?;
        let resolved = self.guard.resolve_peer(reference, caller_id).await?;

        let message = Message::new(
            caller_id,
            &resolved.peer_user_id,
            content.to_string(),
            is_system,
        );

        // The pair may have been removed since the guard looked
        if !self.messages.insert_message(&message).await? {
            return Err(Error::Forbidden(
                "Relationship is not active on both sides".into(),
            ));
        }

        info!(
            "[Channel] Message {} sent: {} -> {}{}",
            message.id,
            caller_id,
            resolved.peer_user_id,
            if is_system { " (system)" } else { "" }
        );
        Ok(message)
    }

    /// Full history with the peer, oldest first
    pub async fn list_messages(&self, reference: &str, caller_id: &str) -> Result<Vec<Message>> {
        let resolved = self.guard.resolve_peer(reference, caller_id).await?;
        self.messages
            .messages_between(caller_id, &resolved.peer_user_id)
            .await
    }

    /// Mark the peer's messages to the caller as read; returns how many changed
    pub async fn mark_read(
        &self,
        reference: &str,
        caller_id: &str,
        only_unread: bool,
    ) -> Result<u64> {
        let resolved = self.guard.resolve_peer(reference, caller_id).await?;
        let changed = self
            .messages
            .mark_read(caller_id, &resolved.peer_user_id, only_unread)
            .await?;

        debug!(
            "[Channel] {} marked {} message(s) from {} read",
            caller_id, changed, resolved.peer_user_id
        );
        Ok(changed)
    }
}
