//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{CheckpointRecord, Database, Message};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable latest-history-per-thread storage
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replace the thread's history if its version still equals
    /// `expected_version`. Returns the new version.
    async fn commit(
        &self,
        thread_id: &str,
        messages: &[Message],
        expected_version: i64,
    ) -> Result<i64, String>;

    /// Latest checkpoint, `None` for a thread never seen
    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>, String>;

    /// Set or clear the per-thread model override
    async fn set_thread_model(&self, thread_id: &str, model: Option<&str>) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn commit(
        &self,
        thread_id: &str,
        messages: &[Message],
        expected_version: i64,
    ) -> Result<i64, String> {
        (**self).commit(thread_id, messages, expected_version).await
    }

    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>, String> {
        (**self).load(thread_id).await
    }

    async fn set_thread_model(&self, thread_id: &str, model: Option<&str>) -> Result<(), String> {
        (**self).set_thread_model(thread_id, model).await
    }
}

// ============================================================================
// Production Implementations
// ============================================================================

/// Production storage backed by the SQLite database
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for DatabaseStorage {
    async fn commit(
        &self,
        thread_id: &str,
        messages: &[Message],
        expected_version: i64,
    ) -> Result<i64, String> {
        self.db
            .commit_checkpoint(thread_id, messages, expected_version)
            .map_err(|e| e.to_string())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>, String> {
        self.db.load_checkpoint(thread_id).map_err(|e| e.to_string())
    }

    async fn set_thread_model(&self, thread_id: &str, model: Option<&str>) -> Result<(), String> {
        self.db
            .set_thread_model(thread_id, model)
            .map_err(|e| e.to_string())
    }
}
