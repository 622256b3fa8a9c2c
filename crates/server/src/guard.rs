//! Relationship authorization
//!
//! Every channel operation names a relationship, either by the caller's
//! own edge id or by the canonical relationship id both parties share.
//! The guard turns that reference into the peer's identity, but only when
//! both edges of the mirrored pair are active.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{validate_id, EdgeState, RelationshipEdge};
use crate::store::RelationshipStore;

/// Caller's edge plus the peer it points at
#[derive(Debug, Clone)]
pub struct ResolvedPeer {
    pub edge: RelationshipEdge,
    pub peer_user_id: String,
}

/// Find the caller's edge for `reference` (edge id or relationship id).
pub(crate) async fn locate_owned_edge(
    store: &dyn RelationshipStore,
    reference: &str,
    caller_id: &str,
) -> Result<RelationshipEdge> {
    validate_id("relationship reference", reference)?;

    if let Some(edge) = store.get_edge(reference).await? {
        if edge.owner_user_id != caller_id {
            return Err(Error::Unauthorized(
                "Relationship belongs to another user".into(),
            ));
        }
        return Ok(edge);
    }

    store
        .find_by_relationship(reference, caller_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Relationship not found: {}", reference)))
}

pub struct AuthorizationGuard {
    edges: Arc<dyn RelationshipStore>,
}

impl AuthorizationGuard {
    pub fn new(edges: Arc<dyn RelationshipStore>) -> Self {
        Self { edges }
    }

    pub async fn resolve_peer(&self, reference: &str, caller_id: &str) -> Result<ResolvedPeer> {
        let edge = locate_owned_edge(self.edges.as_ref(), reference, caller_id).await?;

        if edge.state != EdgeState::Active {
            return Err(Error::Forbidden(format!(
                "Relationship is {}, not active",
                edge.state
            )));
        }

        let mirror = self.edges.find_edge(&edge.peer_user_id, caller_id).await?;
        match mirror {
            Some(m) if m.state == EdgeState::Active => {}
            _ => {
                debug!(
                    "[Guard] Refusing half-active pair {} ({} -> {})",
                    edge.relationship_id, caller_id, edge.peer_user_id
                );
                return Err(Error::Forbidden(
                    "Relationship is not active on both sides".into(),
                ));
            }
        }

        Ok(ResolvedPeer {
            peer_user_id: edge.peer_user_id.clone(),
            edge,
        })
    }
}
