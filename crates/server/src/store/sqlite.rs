//! SQLite-backed store
//!
//! Users, relationship edges and messages live in one database file.
//! Multi-record writes (pair activation, removal, blocking) run inside a
//! single transaction so a pair never lands half-written.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{MessageStore, RelationshipStore, UserStore};
use crate::error::{Error, Result};
use crate::models::{self, EdgeState, Message, RelationshipEdge, UserProfile};

const EDGE_COLUMNS: &str = "id, owner_user_id, peer_user_id, relationship_id, state, \
     requested_by_user_id, created_at, established_at";

const MESSAGE_COLUMNS: &str =
    "id, sender_user_id, recipient_user_id, content, is_system, is_read, created_at";

/// Fixed-width timestamps so text ordering matches time ordering
fn to_db_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Corrupt timestamp {:?}: {}", s, e)))
}

fn conflict_on_unique(err: sqlx::Error, message: &str) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Conflict(message.to_string())
        }
        _ => Error::Store(err),
    }
}

/// Case-folded name and email; SQLite's `lower()` only folds ASCII
fn search_key(user: &UserProfile) -> String {
    format!("{}\n{}", user.display_name, user.email).to_lowercase()
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(FromRow)]
struct EdgeRow {
    id: String,
    owner_user_id: String,
    peer_user_id: String,
    relationship_id: String,
    state: EdgeState,
    requested_by_user_id: String,
    created_at: String,
    established_at: Option<String>,
}

impl TryFrom<EdgeRow> for RelationshipEdge {
    type Error = Error;

    fn try_from(row: EdgeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            owner_user_id: row.owner_user_id,
            peer_user_id: row.peer_user_id,
            relationship_id: row.relationship_id,
            state: row.state,
            requested_by_user_id: row.requested_by_user_id,
            created_at: from_db_time(&row.created_at)?,
            established_at: row
                .established_at
                .as_deref()
                .map(from_db_time)
                .transpose()?,
        })
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: String,
    sender_user_id: String,
    recipient_user_id: String,
    content: String,
    is_system: bool,
    is_read: bool,
    created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            sender_user_id: row.sender_user_id,
            recipient_user_id: row.recipient_user_id,
            content: row.content,
            is_system: row.is_system,
            is_read: row.is_read,
            created_at: from_db_time(&row.created_at)?,
        })
    }
}

fn edges(rows: Vec<EdgeRow>) -> Result<Vec<RelationshipEdge>> {
    rows.into_iter().map(RelationshipEdge::try_from).collect()
}

fn messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

/// Insert or overwrite the mirror `(edge.peer -> edge.owner)` as active.
async fn upsert_active_mirror(conn: &mut SqliteConnection, edge: &RelationshipEdge) -> Result<()> {
    let established_at = edge.established_at.unwrap_or_else(models::now);

    sqlx::query(
        r#"
        INSERT INTO relationship_edges
            (id, owner_user_id, peer_user_id, relationship_id, state,
             requested_by_user_id, created_at, established_at)
        VALUES (?, ?, ?, ?, 'active', ?, ?, ?)
        ON CONFLICT(owner_user_id, peer_user_id) DO UPDATE SET
            state = 'active',
            requested_by_user_id = excluded.requested_by_user_id,
            established_at = excluded.established_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&edge.peer_user_id)
    .bind(&edge.owner_user_id)
    .bind(&edge.relationship_id)
    .bind(&edge.requested_by_user_id)
    .bind(to_db_time(&models::now()))
    .bind(to_db_time(&established_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn fetch_edge(conn: &mut SqliteConnection, edge_id: &str) -> Result<Option<RelationshipEdge>> {
    let row: Option<EdgeRow> = sqlx::query_as(&format!(
        "SELECT {} FROM relationship_edges WHERE id = ?",
        EDGE_COLUMNS
    ))
    .bind(edge_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(RelationshipEdge::try_from).transpose()
}

/// Store backed by a single SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path`
    pub async fn open(path: &Path, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            path.to_string_lossy().replace('\\', "/")
        ))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_db().await?;

        info!("[Store] Initialized at {:?}", path);
        Ok(store)
    }

    /// Initialize database tables
    async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                search_key TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // One row per (owner, peer); a friendship is two mirrored rows
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relationship_edges (
                id TEXT PRIMARY KEY,
                owner_user_id TEXT NOT NULL,
                peer_user_id TEXT NOT NULL,
                relationship_id TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'pending',
                requested_by_user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                established_at TEXT,
                UNIQUE(owner_user_id, peer_user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_edges_owner_state \
             ON relationship_edges(owner_user_id, state)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_edges_relationship \
             ON relationship_edges(relationship_id)",
        )
        .execute(&self.pool)
        .await?;

        // seq breaks ties between messages created in the same microsecond
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                sender_user_id TEXT NOT NULL,
                recipient_user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                is_system INTEGER NOT NULL DEFAULT 0,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_pair \
             ON messages(sender_user_id, recipient_user_id, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RelationshipStore for SqliteStore {
    async fn get_edge(&self, edge_id: &str) -> Result<Option<RelationshipEdge>> {
        let mut conn = self.pool.acquire().await?;
        fetch_edge(&mut conn, edge_id).await
    }

    async fn find_edge(&self, owner: &str, peer: &str) -> Result<Option<RelationshipEdge>> {
        let row: Option<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM relationship_edges WHERE owner_user_id = ? AND peer_user_id = ?",
            EDGE_COLUMNS
        ))
        .bind(owner)
        .bind(peer)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RelationshipEdge::try_from).transpose()
    }

    async fn find_by_relationship(
        &self,
        relationship_id: &str,
        owner: &str,
    ) -> Result<Option<RelationshipEdge>> {
        let row: Option<EdgeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM relationship_edges WHERE relationship_id = ? AND owner_user_id = ?",
            EDGE_COLUMNS
        ))
        .bind(relationship_id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        row.map(RelationshipEdge::try_from).transpose()
    }

    async fn list_edges(
        &self,
        owner: &str,
        state: Option<EdgeState>,
    ) -> Result<Vec<RelationshipEdge>> {
        let rows: Vec<EdgeRow> = match state {
            Some(state) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM relationship_edges WHERE owner_user_id = ? AND state = ? \
                     ORDER BY COALESCE(established_at, created_at), id",
                    EDGE_COLUMNS
                ))
                .bind(owner)
                .bind(state)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM relationship_edges WHERE owner_user_id = ? \
                     ORDER BY COALESCE(established_at, created_at), id",
                    EDGE_COLUMNS
                ))
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
        };

        edges(rows)
    }

    async fn insert_edge(&self, edge: &RelationshipEdge) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO relationship_edges ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            EDGE_COLUMNS
        ))
        .bind(&edge.id)
        .bind(&edge.owner_user_id)
        .bind(&edge.peer_user_id)
        .bind(&edge.relationship_id)
        .bind(edge.state)
        .bind(&edge.requested_by_user_id)
        .bind(to_db_time(&edge.created_at))
        .bind(edge.established_at.as_ref().map(to_db_time))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Relationship already exists"))?;

        debug!(
            "[Store] Edge {} inserted ({} -> {}, {})",
            edge.id, edge.owner_user_id, edge.peer_user_id, edge.state
        );
        Ok(())
    }

    async fn transition(&self, edge_id: &str, from: EdgeState, to: EdgeState) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE relationship_edges SET state = ?, established_at = NULL \
             WHERE id = ? AND state = ?",
        )
        .bind(to)
        .bind(edge_id)
        .bind(from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reopen_edge(&self, edge_id: &str, requested_by: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE relationship_edges \
             SET state = 'pending', requested_by_user_id = ?, created_at = ?, established_at = NULL \
             WHERE id = ? AND state = 'rejected'",
        )
        .bind(requested_by)
        .bind(to_db_time(&models::now()))
        .bind(edge_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn activate_pair(
        &self,
        edge_id: &str,
        owner: &str,
        established_at: DateTime<Utc>,
    ) -> Result<Option<RelationshipEdge>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE relationship_edges SET state = 'active', established_at = ? \
             WHERE id = ? AND owner_user_id = ? AND state = 'pending'",
        )
        .bind(to_db_time(&established_at))
        .bind(edge_id)
        .bind(owner)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let edge = fetch_edge(&mut tx, edge_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Edge {} vanished mid-transaction", edge_id)))?;
        upsert_active_mirror(&mut tx, &edge).await?;

        tx.commit().await?;
        Ok(Some(edge))
    }

    async fn remove_pair(&self, edge_id: &str, owner: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock from the start
        let peer: Option<(String,)> = sqlx::query_as(
            "DELETE FROM relationship_edges \
             WHERE id = ? AND owner_user_id = ? AND state = 'active' \
             RETURNING peer_user_id",
        )
        .bind(edge_id)
        .bind(owner)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((peer,)) = peer else {
            tx.rollback().await?;
            return Ok(false);
        };

        sqlx::query("DELETE FROM relationship_edges WHERE owner_user_id = ? AND peer_user_id = ?")
            .bind(&peer)
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn block(&self, owner: &str, peer: &str) -> Result<RelationshipEdge> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO relationship_edges
                (id, owner_user_id, peer_user_id, relationship_id, state,
                 requested_by_user_id, created_at, established_at)
            VALUES (?, ?, ?, ?, 'blocked', ?, ?, NULL)
            ON CONFLICT(owner_user_id, peer_user_id) DO UPDATE SET
                state = 'blocked',
                requested_by_user_id = excluded.requested_by_user_id,
                established_at = NULL
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner)
        .bind(peer)
        .bind(models::relationship_id(owner, peer))
        .bind(owner)
        .bind(to_db_time(&models::now()))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM relationship_edges WHERE owner_user_id = ? AND peer_user_id = ?")
            .bind(peer)
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        let row: EdgeRow = sqlx::query_as(&format!(
            "SELECT {} FROM relationship_edges WHERE owner_user_id = ? AND peer_user_id = ?",
            EDGE_COLUMNS
        ))
        .bind(owner)
        .bind(peer)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn lone_active_edges(&self) -> Result<Vec<RelationshipEdge>> {
        let rows: Vec<EdgeRow> = sqlx::query_as(
            r#"
            SELECT e.id, e.owner_user_id, e.peer_user_id, e.relationship_id, e.state,
                   e.requested_by_user_id, e.created_at, e.established_at
            FROM relationship_edges e
            LEFT JOIN relationship_edges m
                ON m.owner_user_id = e.peer_user_id AND m.peer_user_id = e.owner_user_id
            WHERE e.state = 'active' AND (m.id IS NULL OR m.state != 'active')
            ORDER BY e.created_at, e.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        edges(rows)
    }

    async fn complete_mirror(&self, edge: &RelationshipEdge) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_active_mirror(&mut conn, edge).await
    }

    async fn delete_edge(&self, edge_id: &str, state: EdgeState) -> Result<bool> {
        let result = sqlx::query("DELETE FROM relationship_edges WHERE id = ? AND state = ?")
            .bind(edge_id)
            .bind(state)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert_message(&self, message: &Message) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (id, sender_user_id, recipient_user_id, content, is_system, is_read, created_at)
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (
                SELECT 1 FROM relationship_edges
                WHERE owner_user_id = ? AND peer_user_id = ? AND state = 'active'
            ) AND EXISTS (
                SELECT 1 FROM relationship_edges
                WHERE owner_user_id = ? AND peer_user_id = ? AND state = 'active'
            )
            "#,
        )
        .bind(&message.id)
        .bind(&message.sender_user_id)
        .bind(&message.recipient_user_id)
        .bind(&message.content)
        .bind(message.is_system)
        .bind(message.is_read)
        .bind(to_db_time(&message.created_at))
        .bind(&message.sender_user_id)
        .bind(&message.recipient_user_id)
        .bind(&message.recipient_user_id)
        .bind(&message.sender_user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn messages_between(&self, a: &str, b: &str) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages \
             WHERE (sender_user_id = ? AND recipient_user_id = ?) \
                OR (sender_user_id = ? AND recipient_user_id = ?) \
             ORDER BY created_at ASC, seq ASC",
            MESSAGE_COLUMNS
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.pool)
        .await?;

        messages(rows)
    }

    async fn latest_between(&self, a: &str, b: &str) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {} FROM messages \
             WHERE (sender_user_id = ? AND recipient_user_id = ?) \
                OR (sender_user_id = ? AND recipient_user_id = ?) \
             ORDER BY created_at DESC, seq DESC LIMIT 1",
            MESSAGE_COLUMNS
        ))
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn unread_count(&self, recipient: &str, sender: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE recipient_user_id = ? AND sender_user_id = ? AND is_read = 0",
        )
        .bind(recipient)
        .bind(sender)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn mark_read(&self, recipient: &str, sender: &str, only_unread: bool) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        // Only rows flipping from unread count as changed
        let changed = sqlx::query(
            "UPDATE messages SET is_read = 1 \
             WHERE recipient_user_id = ? AND sender_user_id = ? AND is_read = 0",
        )
        .bind(recipient)
        .bind(sender)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if !only_unread {
            sqlx::query(
                "UPDATE messages SET is_read = 1 \
                 WHERE recipient_user_id = ? AND sender_user_id = ?",
            )
            .bind(recipient)
            .bind(sender)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(changed)
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row: Option<(String, String, String)> =
            sqlx::query_as("SELECT id, display_name, email FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, display_name, email)| UserProfile {
            id,
            display_name,
            email,
        }))
    }

    async fn search_users(
        &self,
        query: &str,
        exclude_user_id: &str,
        limit: u32,
    ) -> Result<Vec<UserProfile>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT id, display_name, email FROM users
            WHERE id != ? AND search_key LIKE ? ESCAPE '\'
            ORDER BY display_name, id
            LIMIT ?
            "#,
        )
        .bind(exclude_user_id)
        .bind(&pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, display_name, email)| UserProfile {
                id,
                display_name,
                email,
            })
            .collect())
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        let now = to_db_time(&models::now());

        sqlx::query(
            r#"
            INSERT INTO users (id, display_name, email, search_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                search_key = excluded.search_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(search_key(user))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(&dir.path().join("test.sqlite"), 4)
            .await
            .unwrap()
    }

    #[test]
    fn test_db_time_is_fixed_width() {
        let t = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_db_time(&t), "2026-01-02T03:04:05.000000Z");
        assert_eq!(from_db_time(&to_db_time(&t)).unwrap(), t);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[tokio::test]
    async fn test_activate_pair_creates_mirror() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let edge = RelationshipEdge::pending("bob", "alice");
        store.insert_edge(&edge).await.unwrap();

        let at = models::now();
        let activated = store
            .activate_pair(&edge.id, "bob", at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(activated.state, EdgeState::Active);
        assert_eq!(activated.established_at, Some(at));

        let mirror = store.find_edge("alice", "bob").await.unwrap().unwrap();
        assert_eq!(mirror.state, EdgeState::Active);
        assert_eq!(mirror.established_at, Some(at));
        assert_eq!(mirror.relationship_id, edge.relationship_id);

        // Second activation loses the compare-and-swap
        assert!(store
            .activate_pair(&edge.id, "bob", models::now())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_activate_pair_requires_owner() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let edge = RelationshipEdge::pending("bob", "alice");
        store.insert_edge(&edge).await.unwrap();

        assert!(store
            .activate_pair(&edge.id, "alice", models::now())
            .await
            .unwrap()
            .is_none());
        assert!(store.find_edge("alice", "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_edge_is_conflict() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .insert_edge(&RelationshipEdge::pending("bob", "alice"))
            .await
            .unwrap();
        let result = store
            .insert_edge(&RelationshipEdge::pending("bob", "alice"))
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_insert_message_requires_active_pair() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let msg = Message::new("alice", "bob", "hi".into(), false);
        assert!(!store.insert_message(&msg).await.unwrap());

        let edge = RelationshipEdge::pending("bob", "alice");
        store.insert_edge(&edge).await.unwrap();
        assert!(!store.insert_message(&msg).await.unwrap());

        store
            .activate_pair(&edge.id, "bob", models::now())
            .await
            .unwrap();
        assert!(store.insert_message(&msg).await.unwrap());

        let listed = store.messages_between("bob", "alice").await.unwrap();
        assert_eq!(listed, vec![msg]);
    }

    #[tokio::test]
    async fn test_remove_pair_deletes_both_edges() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let edge = RelationshipEdge::pending("bob", "alice");
        store.insert_edge(&edge).await.unwrap();
        store
            .activate_pair(&edge.id, "bob", models::now())
            .await
            .unwrap();

        assert!(!store.remove_pair(&edge.id, "alice").await.unwrap());
        assert!(store.remove_pair(&edge.id, "bob").await.unwrap());
        assert!(store.find_edge("bob", "alice").await.unwrap().is_none());
        assert!(store.find_edge("alice", "bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lone_active_edges() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut lone = RelationshipEdge::pending("bob", "alice");
        lone.state = EdgeState::Active;
        lone.established_at = Some(models::now());
        store.insert_edge(&lone).await.unwrap();

        let healthy = RelationshipEdge::pending("dave", "carol");
        store.insert_edge(&healthy).await.unwrap();
        store
            .activate_pair(&healthy.id, "dave", models::now())
            .await
            .unwrap();

        let found = store.lone_active_edges().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, lone.id);

        store.complete_mirror(&lone).await.unwrap();
        assert!(store.lone_active_edges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_counts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let edge = RelationshipEdge::pending("bob", "alice");
        store.insert_edge(&edge).await.unwrap();
        store
            .activate_pair(&edge.id, "bob", models::now())
            .await
            .unwrap();

        for text in ["one", "two"] {
            let msg = Message::new("alice", "bob", text.into(), false);
            assert!(store.insert_message(&msg).await.unwrap());
        }

        assert_eq!(store.unread_count("bob", "alice").await.unwrap(), 2);
        assert_eq!(store.mark_read("bob", "alice", true).await.unwrap(), 2);
        assert_eq!(store.mark_read("bob", "alice", true).await.unwrap(), 0);
        assert_eq!(store.mark_read("bob", "alice", false).await.unwrap(), 0);
        assert_eq!(store.unread_count("bob", "alice").await.unwrap(), 0);

        let msg = Message::new("alice", "bob", "three".into(), false);
        assert!(store.insert_message(&msg).await.unwrap());
        assert_eq!(store.mark_read("bob", "alice", false).await.unwrap(), 1);
        assert_eq!(store.mark_read("bob", "alice", false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_search_and_email_conflict() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let alice = UserProfile {
            id: "alice".into(),
            display_name: "Alice Liddell".into(),
            email: "alice@example.com".into(),
        };
        store.upsert_user(&alice).await.unwrap();
        store
            .upsert_user(&UserProfile {
                id: "bob".into(),
                display_name: "Bob".into(),
                email: "bob@example.com".into(),
            })
            .await
            .unwrap();

        let hits = store.search_users("LIDDELL", "bob", 10).await.unwrap();
        assert_eq!(hits, vec![alice.clone()]);

        let hits = store.search_users("example", "alice", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "bob");

        let hits = store.search_users("%", "nobody", 10).await.unwrap();
        assert!(hits.is_empty());

        // Name and email never run together into one match
        let hits = store.search_users("liddell alice", "bob", 10).await.unwrap();
        assert!(hits.is_empty());

        let dup = UserProfile {
            id: "mallory".into(),
            display_name: "Mallory".into(),
            email: "alice@example.com".into(),
        };
        assert!(matches!(
            store.upsert_user(&dup).await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_case() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let emile = UserProfile {
            id: "emile".into(),
            display_name: "Émile Zola".into(),
            email: "emile@example.com".into(),
        };
        store.upsert_user(&emile).await.unwrap();

        for query in ["émile", "ÉMILE", "zola"] {
            let hits = store.search_users(query, "nobody", 10).await.unwrap();
            assert_eq!(hits, vec![emile.clone()], "query {:?}", query);
        }

        // Renaming refreshes the search key
        let renamed = UserProfile {
            display_name: "Ærlig Émile".into(),
            ..emile.clone()
        };
        store.upsert_user(&renamed).await.unwrap();
        assert!(store.search_users("zola", "nobody", 10).await.unwrap().is_empty());
        assert_eq!(
            store.search_users("ærlig", "nobody", 10).await.unwrap(),
            vec![renamed]
        );
    }
}
