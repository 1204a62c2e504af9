//! Checkpoint persistence
//!
//! Each thread has one row holding its full message history, a version
//! counter for optimistic concurrency, and an optional model override.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt message history: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid thread id: {0}")]
    InvalidThreadId(String),
    #[error("Version conflict on thread {thread_id}: expected {expected}, found {found}")]
    VersionConflict {
        thread_id: String,
        expected: i64,
        found: i64,
    },
    #[error("Message {0} is still streaming")]
    UnsealedMessage(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Check a thread id against storage limits
pub fn validate_thread_id(thread_id: &str) -> DbResult<()> {
    if thread_id.is_empty() {
        return Err(DbError::InvalidThreadId("thread id is empty".to_string()));
    }
    if thread_id.len() > MAX_THREAD_ID_LEN {
        return Err(DbError::InvalidThreadId(format!(
            "thread id exceeds {MAX_THREAD_ID_LEN} bytes"
        )));
    }
    Ok(())
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        // A checkpoint is only acknowledged once it is on disk.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a thread's history with `messages`.
    ///
    /// Succeeds only if the stored version still equals `expected_version`
    /// (0 for a thread that was never committed). Returns the new version.
    pub fn commit_checkpoint(
        &self,
        thread_id: &str,
        messages: &[Message],
        expected_version: i64,
    ) -> DbResult<i64> {
        validate_thread_id(thread_id)?;
        if let Some(open) = messages.iter().find(|m| m.is_streaming()) {
            return Err(DbError::UnsealedMessage(open.id.clone()));
        }
        let body = serde_json::to_string(messages)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let found: i64 = tx
            .query_row(
                "SELECT version FROM threads WHERE id = ?1",
                params![thread_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        if found != expected_version {
            return Err(DbError::VersionConflict {
                thread_id: thread_id.to_string(),
                expected: expected_version,
                found,
            });
        }

        let next = found + 1;
        tx.execute(
            "INSERT INTO threads (id, version, messages, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                version = excluded.version,
                messages = excluded.messages,
                updated_at = excluded.updated_at",
            params![thread_id, next, body, now],
        )?;
        tx.commit()?;

        tracing::debug!(
            thread_id = %thread_id,
            version = next,
            messages = messages.len(),
            "Checkpoint committed"
        );
        Ok(next)
    }

    /// Latest checkpoint for a thread, or `None` if the thread is unknown
    pub fn load_checkpoint(&self, thread_id: &str) -> DbResult<Option<CheckpointRecord>> {
        validate_thread_id(thread_id)?;
        let row = self
            .conn()
            .query_row(
                "SELECT model, version, messages, updated_at FROM threads WHERE id = ?1",
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((model, version, messages, updated_at)) = row else {
            return Ok(None);
        };
        Ok(Some(CheckpointRecord {
            thread_id: thread_id.to_string(),
            messages: serde_json::from_str(&messages)?,
            version,
            model,
            updated_at: parse_datetime(&updated_at),
        }))
    }

    /// Set or clear the model override for a thread. Creates the row if the
    /// thread has no history yet; the version is left untouched.
    pub fn set_thread_model(&self, thread_id: &str, model: Option<&str>) -> DbResult<()> {
        validate_thread_id(thread_id)?;
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO threads (id, model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET
                model = excluded.model,
                updated_at = excluded.updated_at",
            params![thread_id, model, now],
        )?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
