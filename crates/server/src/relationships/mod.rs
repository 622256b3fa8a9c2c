//! Relationship Requests Module
//!
//! Drives the request -> accept/reject lifecycle of mirrored relationship
//! edges. A request creates one pending edge owned by the recipient;
//! accepting it activates that edge and its mirror in one store
//! transaction. Pairs that end up half-active anyway are fixed by the
//! repair pass in [`repair`].

pub mod repair;

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::guard::locate_owned_edge;
use crate::models::{
    self, validate_id, EdgeState, IncomingRequest, RelationState, RelationshipEdge,
    UserWithRelationState,
};
use crate::store::RelationshipStore;
use crate::users::UserDirectory;

pub use repair::{spawn_repair_task, RepairAction, RepairReport};

/// Product rules the lifecycle depends on
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    /// Let a sender whose request was rejected ask again
    pub allow_request_after_rejection: bool,
    pub search_limit: u32,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            allow_request_after_rejection: false,
            search_limit: 20,
        }
    }
}

pub struct RequestService {
    edges: Arc<dyn RelationshipStore>,
    users: Arc<UserDirectory>,
    policy: RequestPolicy,
}

impl RequestService {
    pub fn new(
        edges: Arc<dyn RelationshipStore>,
        users: Arc<UserDirectory>,
        policy: RequestPolicy,
    ) -> Self {
        Self {
            edges,
            users,
            policy,
        }
    }

    /// Users matching `query`, annotated with the caller's own edge state
    pub async fn search_users(
        &self,
        caller_id: &str,
        query: &str,
    ) -> Result<Vec<UserWithRelationState>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("Search query must not be empty".into()));
        }

        let candidates = self
            .users
            .search(query, caller_id, self.policy.search_limit)
            .await?;

        try_join_all(candidates.into_iter().map(|user| async move {
            let edge = self.edges.find_edge(caller_id, &user.id).await?;
            Ok::<_, Error>(UserWithRelationState {
                relation_state: RelationState::from(edge.map(|e| e.state)),
                user,
            })
        }))
        .await
    }

    /// Send a request from `caller_id` to `target_id`.
    ///
    /// Creates one pending edge owned by the target. Nothing is written on
    /// the caller's side until the target accepts.
    pub async fn send_request(&self, caller_id: &str, target_id: &str) -> Result<RelationshipEdge> {
        validate_id("user id", caller_id)?;
        validate_id("target id", target_id)?;
        if caller_id == target_id {
            return Err(Error::Validation(
                "Cannot send a request to yourself".into(),
            ));
        }
        self.users.require(target_id).await?;

        if let Some(outgoing) = self.edges.find_edge(caller_id, target_id).await? {
            match outgoing.state {
                EdgeState::Pending => {
                    return Err(Error::Conflict(
                        "This user has already sent you a request".into(),
                    ))
                }
                EdgeState::Active => return Err(Error::Conflict("Already connected".into())),
                EdgeState::Blocked => {
                    return Err(Error::Conflict("You have blocked this user".into()))
                }
                EdgeState::Rejected => {}
            }
        }

        let edge = match self.edges.find_edge(target_id, caller_id).await? {
            None => {
                let edge = RelationshipEdge::pending(target_id, caller_id);
                self.edges.insert_edge(&edge).await?;
                edge
            }
            Some(existing) => match existing.state {
                EdgeState::Pending => {
                    return Err(Error::Conflict("Request already pending".into()))
                }
                EdgeState::Active => return Err(Error::Conflict("Already connected".into())),
                EdgeState::Blocked => {
                    return Err(Error::Conflict("Request not allowed".into()))
                }
                EdgeState::Rejected if !self.policy.allow_request_after_rejection => {
                    return Err(Error::Conflict("Request was rejected".into()))
                }
                EdgeState::Rejected => {
                    if !self.edges.reopen_edge(&existing.id, caller_id).await? {
                        return Err(Error::Conflict("Request state changed".into()));
                    }
                    self.edges.get_edge(&existing.id).await?.ok_or_else(|| {
                        Error::NotFound(format!("Relationship not found: {}", existing.id))
                    })?
                }
            },
        };

        info!(
            "[Relationships] Request sent: {} -> {} (edge {})",
            caller_id, target_id, edge.id
        );
        Ok(edge)
    }

    /// Accept a pending request owned by the caller
    pub async fn accept_request(&self, edge_id: &str, caller_id: &str) -> Result<RelationshipEdge> {
        let edge = locate_owned_edge(self.edges.as_ref(), edge_id, caller_id).await?;
        if edge.state != EdgeState::Pending {
            return Err(Error::Conflict(format!(
                "Request is {}, not pending",
                edge.state
            )));
        }

        let activated = self
            .edges
            .activate_pair(&edge.id, caller_id, models::now())
            .await?
            .ok_or_else(|| Error::Conflict("Request is no longer pending".into()))?;

        info!(
            "[Relationships] Request {} accepted: {} <-> {}",
            activated.id, activated.owner_user_id, activated.peer_user_id
        );
        Ok(activated)
    }

    /// Reject a pending request owned by the caller. No mirror is created.
    pub async fn reject_request(&self, edge_id: &str, caller_id: &str) -> Result<RelationshipEdge> {
        let mut edge = locate_owned_edge(self.edges.as_ref(), edge_id, caller_id).await?;
        if edge.state != EdgeState::Pending {
            return Err(Error::Conflict(format!(
                "Request is {}, not pending",
                edge.state
            )));
        }

        if !self
            .edges
            .transition(&edge.id, EdgeState::Pending, EdgeState::Rejected)
            .await?
        {
            return Err(Error::Conflict("Request is no longer pending".into()));
        }
        edge.state = EdgeState::Rejected;

        info!("[Relationships] Request {} rejected", edge.id);
        Ok(edge)
    }

    /// Remove an active relationship; both edges go together
    pub async fn remove_relationship(&self, edge_id: &str, caller_id: &str) -> Result<()> {
        let edge = locate_owned_edge(self.edges.as_ref(), edge_id, caller_id).await?;
        if edge.state != EdgeState::Active {
            return Err(Error::Conflict(format!(
                "Relationship is {}, not active",
                edge.state
            )));
        }

        if !self.edges.remove_pair(&edge.id, caller_id).await? {
            return Err(Error::Conflict("Relationship is no longer active".into()));
        }

        info!(
            "[Relationships] Removed: {} <-> {}",
            caller_id, edge.peer_user_id
        );
        Ok(())
    }

    /// Block `target_id`. Any edge the target holds toward the caller is dropped.
    pub async fn block_user(&self, caller_id: &str, target_id: &str) -> Result<RelationshipEdge> {
        validate_id("user id", caller_id)?;
        validate_id("target id", target_id)?;
        if caller_id == target_id {
            return Err(Error::Validation("Cannot block yourself".into()));
        }
        self.users.require(target_id).await?;

        let edge = self.edges.block(caller_id, target_id).await?;
        info!("[Relationships] {} blocked {}", caller_id, target_id);
        Ok(edge)
    }

    /// Pending requests addressed to the caller
    pub async fn list_incoming_requests(&self, caller_id: &str) -> Result<Vec<IncomingRequest>> {
        let pending = self
            .edges
            .list_edges(caller_id, Some(EdgeState::Pending))
            .await?;

        try_join_all(pending.into_iter().map(|edge| async move {
            let requested_by = self
                .users
                .profile_or_placeholder(&edge.requested_by_user_id)
                .await?;
            Ok::<_, Error>(IncomingRequest {
                edge_id: edge.id,
                relationship_id: edge.relationship_id,
                requested_by,
                state: edge.state,
                created_at: edge.created_at,
            })
        }))
        .await
    }

    /// The caller's edges, optionally filtered by state name
    pub async fn list_relationships(
        &self,
        caller_id: &str,
        state: Option<&str>,
    ) -> Result<Vec<RelationshipEdge>> {
        let state = state
            .filter(|s| !s.is_empty())
            .map(str::parse::<EdgeState>)
            .transpose()?;
        self.edges.list_edges(caller_id, state).await
    }
}
