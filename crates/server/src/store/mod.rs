//! Persistence seams
//!
//! Relationship edges, messages and user profiles are persisted through
//! these traits. The services above them hold all business rules; the
//! stores only offer the atomic primitives those rules need.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{EdgeState, Message, RelationshipEdge, UserProfile};

pub use sqlite::SqliteStore;

#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn get_edge(&self, edge_id: &str) -> Result<Option<RelationshipEdge>>;

    /// Edge owned by `owner` pointing at `peer`
    async fn find_edge(&self, owner: &str, peer: &str) -> Result<Option<RelationshipEdge>>;

    /// The caller's edge of the pair identified by `relationship_id`
    async fn find_by_relationship(
        &self,
        relationship_id: &str,
        owner: &str,
    ) -> Result<Option<RelationshipEdge>>;

    /// Edges owned by `owner`, oldest first
    async fn list_edges(
        &self,
        owner: &str,
        state: Option<EdgeState>,
    ) -> Result<Vec<RelationshipEdge>>;

    /// Fails with `Conflict` if `(owner, peer)` already has an edge.
    async fn insert_edge(&self, edge: &RelationshipEdge) -> Result<()>;

    /// Compare-and-swap `from -> to`, clearing `established_at`.
    /// Activation goes through [`RelationshipStore::activate_pair`].
    async fn transition(&self, edge_id: &str, from: EdgeState, to: EdgeState) -> Result<bool>;

    /// Compare-and-swap a rejected edge back to pending for a new requester.
    async fn reopen_edge(&self, edge_id: &str, requested_by: &str) -> Result<bool>;

    /// Atomically move a pending edge owned by `owner` to active and
    /// create-or-update its mirror to active with the same timestamp.
    /// Returns `None` when the edge was not pending.
    async fn activate_pair(
        &self,
        edge_id: &str,
        owner: &str,
        established_at: DateTime<Utc>,
    ) -> Result<Option<RelationshipEdge>>;

    /// Atomically delete an active edge owned by `owner` and its mirror.
    async fn remove_pair(&self, edge_id: &str, owner: &str) -> Result<bool>;

    /// Atomically mark `owner -> peer` blocked and drop `peer -> owner`.
    async fn block(&self, owner: &str, peer: &str) -> Result<RelationshipEdge>;

    /// Active edges whose mirror is missing or not active
    async fn lone_active_edges(&self) -> Result<Vec<RelationshipEdge>>;

    /// Create-or-update the mirror of an active edge to active.
    async fn complete_mirror(&self, edge: &RelationshipEdge) -> Result<()>;

    /// Delete an edge if it is still in `state`.
    async fn delete_edge(&self, edge_id: &str, state: EdgeState) -> Result<bool>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists the message only while both edges between sender and
    /// recipient are active. Returns `false` when the pair is not active.
    async fn insert_message(&self, message: &Message) -> Result<bool>;

    /// Messages between `a` and `b` in either direction, oldest first
    async fn messages_between(&self, a: &str, b: &str) -> Result<Vec<Message>>;

    async fn latest_between(&self, a: &str, b: &str) -> Result<Option<Message>>;

    async fn unread_count(&self, recipient: &str, sender: &str) -> Result<u64>;

    /// Returns how many messages went from unread to read.
    async fn mark_read(&self, recipient: &str, sender: &str, only_unread: bool) -> Result<u64>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn search_users(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: u32,
    ) -> Result<Vec<UserProfile>>;

    /// Fails with `Conflict` if the email belongs to another user.
    async fn upsert_user(&self, user: &UserProfile) -> Result<()>;
}
