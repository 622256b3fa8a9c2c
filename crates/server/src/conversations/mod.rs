//! Conversation list
//!
//! Joins the caller's active edges with the latest message and unread
//! count per peer. Nothing here is stored; the view is rebuilt on every
//! request so polling clients always see current data.

use futures::future::try_join_all;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{ConversationView, EdgeState, RelationshipEdge};
use crate::store::{MessageStore, RelationshipStore};
use crate::users::UserDirectory;

pub struct ConversationAggregator {
    edges: Arc<dyn RelationshipStore>,
    messages: Arc<dyn MessageStore>,
    users: Arc<UserDirectory>,
}

/// Newest conversation first; conversations without messages last
fn by_recency(a: &ConversationView, b: &ConversationView) -> Ordering {
    match (&a.last_message, &b.last_message) {
        (Some(x), Some(y)) => y.created_at.cmp(&x.created_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl ConversationAggregator {
    pub fn new(
        edges: Arc<dyn RelationshipStore>,
        messages: Arc<dyn MessageStore>,
        users: Arc<UserDirectory>,
    ) -> Self {
        Self {
            edges,
            messages,
            users,
        }
    }

    async fn view_for(&self, caller_id: &str, edge: RelationshipEdge) -> Result<ConversationView> {
        let peer_id = edge.peer_user_id.as_str();
        let (peer, last_message, unread_count) = futures::try_join!(
            self.users.profile_or_placeholder(peer_id),
            self.messages.latest_between(caller_id, peer_id),
            self.messages.unread_count(caller_id, peer_id),
        )?;

        Ok(ConversationView {
            peer,
            edge_id: edge.id,
            relationship_id: edge.relationship_id,
            last_message,
            unread_count,
        })
    }

    pub async fn list_conversations(&self, caller_id: &str) -> Result<Vec<ConversationView>> {
        // Ordered by established_at; the stable sort keeps that order for
        // conversations that have no messages yet
        let active = self
            .edges
            .list_edges(caller_id, Some(EdgeState::Active))
            .await?;

        let mut views =
            try_join_all(active.into_iter().map(|edge| self.view_for(caller_id, edge))).await?;
        views.sort_by(by_recency);
        Ok(views)
    }
}
