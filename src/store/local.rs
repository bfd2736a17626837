//! `SQLite`-backed store for single-device use

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

use super::{ChatMessage, Profile, ProfileStore, Role};
use crate::{Error, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Profile and history store in a local database file
#[derive(Clone)]
pub struct LocalStore {
    pool: DbPool,
}

impl LocalStore {
    /// Open (creating if needed) the database at `path`
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened or initialized
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| Error::Database(e.to_string()))?;

        let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
        migrate(&conn)?;

        tracing::info!(version = SCHEMA_VERSION, "database initialized");
        Ok(Self { pool })
    }

    /// Open an in-memory database (for testing)
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be initialized
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| Error::Database(e.to_string()))?;

        let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
        migrate(&conn)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    fn load_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT wonder, excitement, explanation_style, dislikes, age_group,
                        recent_confusion, is_onboarded
                 FROM profiles WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(Profile {
                        wonder: row.get(0)?,
                        excitement: row.get(1)?,
                        explanation_style: row.get(2)?,
                        dislikes: row.get(3)?,
                        age_group: row.get(4)?,
                        recent_confusion: row.get(5)?,
                        is_onboarded: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn upsert_profile(&self, user_id: &str, profile: &Profile) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        // COALESCE keeps the stored value wherever the update leaves a field unset
        conn.execute(
            "INSERT INTO profiles (user_id, wonder, excitement, explanation_style, dislikes,
                                   age_group, recent_confusion, is_onboarded, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(user_id) DO UPDATE SET
                wonder = COALESCE(excluded.wonder, wonder),
                excitement = COALESCE(excluded.excitement, excitement),
                explanation_style = COALESCE(excluded.explanation_style, explanation_style),
                dislikes = COALESCE(excluded.dislikes, dislikes),
                age_group = COALESCE(excluded.age_group, age_group),
                recent_confusion = COALESCE(excluded.recent_confusion, recent_confusion),
                is_onboarded = COALESCE(excluded.is_onboarded, is_onboarded),
                updated_at = excluded.updated_at",
            params![
                user_id,
                profile.wonder,
                profile.excitement,
                profile.explanation_style,
                profile.dislikes,
                profile.age_group,
                profile.recent_confusion,
                profile.is_onboarded,
                now,
            ],
        )?;

        tracing::debug!(user_id, "profile saved");
        Ok(())
    }

    fn insert_message(&self, user_id: &str, role: Role, content: &str) -> Result<ChatMessage> {
        let conn = self.conn()?;
        let message = ChatMessage::new(role, content);

        conn.execute(
            "INSERT INTO messages (user_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                role.as_str(),
                content,
                message.timestamp.to_rfc3339()
            ],
        )?;

        Ok(message)
    }

    fn load_messages(&self, user_id: &str) -> Result<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM messages WHERE user_id = ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map([user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (role, content, created_at) = row?;
            let Some(role) = Role::parse(&role) else {
                tracing::warn!(role = %role, "skipping message with unknown role");
                continue;
            };
            messages.push(ChatMessage {
                role,
                content,
                timestamp: parse_datetime(&created_at),
            });
        }
        Ok(messages)
    }
}

#[async_trait]
impl ProfileStore for LocalStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        self.load_profile(user_id)
    }

    async fn save_profile(&self, user_id: &str, profile: &Profile) -> Result<()> {
        self.upsert_profile(user_id, profile)
    }

    async fn append_message(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ChatMessage> {
        self.insert_message(user_id, role, content)
    }

    async fn list_messages(&self, user_id: &str) -> Result<Vec<ChatMessage>> {
        self.load_messages(user_id)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Bring the schema up to [`SCHEMA_VERSION`]
///
/// # Errors
///
/// Returns error if migration fails
fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS profiles (
            user_id TEXT PRIMARY KEY,
            wonder TEXT,
            excitement TEXT,
            explanation_style TEXT,
            dislikes TEXT,
            age_group TEXT,
            recent_confusion TEXT,
            is_onboarded INTEGER,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id, seq);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::debug!("migrated database to v1");
    Ok(())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
