use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Current time at the precision timestamps are stored with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Longest identifier accepted from callers
pub const MAX_ID_LEN: usize = 128;

/// State of one directional relationship edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EdgeState {
    Pending,
    Active,
    Rejected,
    Blocked,
}

impl EdgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeState::Pending => "pending",
            EdgeState::Active => "active",
            EdgeState::Rejected => "rejected",
            EdgeState::Blocked => "blocked",
        }
    }
}

impl fmt::Display for EdgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(EdgeState::Pending),
            "active" => Ok(EdgeState::Active),
            "rejected" => Ok(EdgeState::Rejected),
            "blocked" => Ok(EdgeState::Blocked),
            other => Err(Error::Validation(format!(
                "Unknown relationship state: {}",
                other
            ))),
        }
    }
}

/// Relationship state as seen from the caller's own edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationState {
    None,
    Pending,
    Active,
    Rejected,
    Blocked,
}

impl From<Option<EdgeState>> for RelationState {
    fn from(state: Option<EdgeState>) -> Self {
        match state {
            None => RelationState::None,
            Some(EdgeState::Pending) => RelationState::Pending,
            Some(EdgeState::Active) => RelationState::Active,
            Some(EdgeState::Rejected) => RelationState::Rejected,
            Some(EdgeState::Blocked) => RelationState::Blocked,
        }
    }
}

/// One directional relationship record, owned by `owner_user_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub id: String,
    pub owner_user_id: String,
    pub peer_user_id: String,
    /// Canonical id shared by both edges of the pair
    pub relationship_id: String,
    pub state: EdgeState,
    pub requested_by_user_id: String,
    pub created_at: DateTime<Utc>,
    pub established_at: Option<DateTime<Utc>>,
}

impl RelationshipEdge {
    /// New pending edge owned by the request recipient
    pub fn pending(recipient: &str, requester: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_user_id: recipient.to_string(),
            peer_user_id: requester.to_string(),
            relationship_id: relationship_id(recipient, requester),
            state: EdgeState::Pending,
            requested_by_user_id: requester.to_string(),
            created_at: now(),
            established_at: None,
        }
    }

    /// True when the owner is the user who received the original request
    pub fn is_recipient_side(&self) -> bool {
        self.owner_user_id != self.requested_by_user_id
    }
}

/// Direct message between two users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_user_id: String,
    pub recipient_user_id: String,
    pub content: String,
    pub is_system: bool,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: &str, recipient: &str, content: String, is_system: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender_user_id: sender.to_string(),
            recipient_user_id: recipient.to_string(),
            content,
            is_system,
            is_read: false,
            created_at: now(),
        }
    }
}

/// Public user profile owned by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

/// Search hit annotated with the caller's relationship state
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRelationState {
    #[serde(flatten)]
    pub user: UserProfile,
    pub relation_state: RelationState,
}

/// Pending request addressed to the caller
#[derive(Debug, Clone, Serialize)]
pub struct IncomingRequest {
    pub edge_id: String,
    pub relationship_id: String,
    pub requested_by: UserProfile,
    pub state: EdgeState,
    pub created_at: DateTime<Utc>,
}

/// One row of the conversation list
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub peer: UserProfile,
    pub edge_id: String,
    pub relationship_id: String,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

/// Canonical, order-independent id for the pair `{a, b}`
pub fn relationship_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update(b":");
    hasher.update(hi.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Reject empty, oversized or whitespace-bearing identifiers
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(Error::Validation(format!("Malformed {}", kind)));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Validation(format!("Malformed {}", kind)));
    }
    Ok(())
}
