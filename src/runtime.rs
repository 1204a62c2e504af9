//! Turn engine
//!
//! Owns per-thread serialization and the history cache, and spawns one
//! executor task per accepted turn.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::{CheckpointStore, DatabaseStorage};

use crate::codec::StreamEvent;
use crate::db::{validate_thread_id, CheckpointRecord, Message};
use crate::llm::{ModelInvoker, ModelRegistry};
use crate::tools::ToolRouter;
use chrono::Utc;
use executor::TurnExecutor;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Records of one turn, ending with exactly one terminal record
pub type TurnStream = ReceiverStream<StreamEvent>;

/// A request to run one turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub thread_id: String,
    pub message: String,
    /// Model for this turn only; falls back to the thread override, then the default
    pub model_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A turn is already in progress for thread {0}")]
    ConcurrentTurnRejected(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Upper bound on a whole turn; `None` waits indefinitely
    pub turn_deadline: Option<Duration>,
    /// Records buffered between the turn task and the client
    pub channel_capacity: usize,
    /// Threads whose history is kept in memory between turns; 0 disables
    pub history_cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            turn_deadline: None,
            channel_capacity: 64,
            history_cache_capacity: 256,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latest known checkpoint for recently active threads, bounded by
/// evicting the least recently used entry
pub(crate) struct HistoryCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Advances on every invalidation. A load that started before an
    /// invalidation may be stale and is not cached.
    generation: u64,
    clock: u64,
}

struct CacheEntry {
    record: CheckpointRecord,
    last_used: u64,
}

impl CacheInner {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

impl HistoryCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
        }
    }

    pub(crate) fn get(&self, thread_id: &str) -> Option<CheckpointRecord> {
        let mut inner = lock(&self.inner);
        let now = inner.tick();
        let entry = inner.entries.get_mut(thread_id)?;
        entry.last_used = now;
        Some(entry.record.clone())
    }

    /// Read before loading from the store; pass to `insert_loaded`
    pub(crate) fn generation(&self) -> u64 {
        lock(&self.inner).generation
    }

    /// Cache a record read from the store, unless an invalidation happened
    /// since `generation` was taken.
    pub(crate) fn insert_loaded(&self, record: CheckpointRecord, generation: u64) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let mut inner = lock(&self.inner);
        if inner.generation != generation {
            tracing::debug!(
                thread_id = %record.thread_id,
                "Not caching history loaded across an invalidation"
            );
            return false;
        }
        let last_used = inner.tick();
        inner
            .entries
            .insert(record.thread_id.clone(), CacheEntry { record, last_used });

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(thread_id, _)| thread_id.clone())
            else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        true
    }

    /// Advance a cached entry to a newly committed history. An entry that is
    /// no longer cached stays out so the next turn reloads it.
    pub(crate) fn record_commit(&self, thread_id: &str, messages: Vec<Message>, version: i64) {
        let mut inner = lock(&self.inner);
        let now = inner.tick();
        if let Some(entry) = inner.entries.get_mut(thread_id) {
            entry.record.messages = messages;
            entry.record.version = version;
            entry.record.updated_at = Utc::now();
            entry.last_used = now;
        }
    }

    pub(crate) fn invalidate(&self, thread_id: &str) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.entries.remove(thread_id);
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, thread_id: &str) -> bool {
        lock(&self.inner).entries.contains_key(thread_id)
    }
}

/// Threads that currently have a turn in flight
#[derive(Default)]
struct ActiveTurns {
    threads: Mutex<HashSet<String>>,
}

impl ActiveTurns {
    fn try_claim(self: &Arc<Self>, thread_id: &str) -> Option<TurnSlot> {
        if !lock(&self.threads).insert(thread_id.to_string()) {
            return None;
        }
        Some(TurnSlot {
            thread_id: thread_id.to_string(),
            active: Arc::clone(self),
        })
    }

    fn contains(&self, thread_id: &str) -> bool {
        lock(&self.threads).contains(thread_id)
    }
}

/// Exclusive right to run a turn on one thread; released on drop
pub(crate) struct TurnSlot {
    thread_id: String,
    active: Arc<ActiveTurns>,
}

impl Drop for TurnSlot {
    fn drop(&mut self) {
        lock(&self.active.threads).remove(&self.thread_id);
        tracing::debug!(thread_id = %self.thread_id, "Released turn slot");
    }
}

/// Shared handles an executor needs
#[derive(Clone)]
pub(crate) struct TurnDeps {
    pub(crate) store: Arc<dyn CheckpointStore>,
    pub(crate) invoker: Arc<dyn ModelInvoker>,
    pub(crate) router: Arc<ToolRouter>,
    pub(crate) models: Arc<ModelRegistry>,
    pub(crate) cache: Arc<HistoryCache>,
}

pub struct ConversationEngine {
    deps: TurnDeps,
    active: Arc<ActiveTurns>,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        invoker: Arc<dyn ModelInvoker>,
        router: Arc<ToolRouter>,
        models: Arc<ModelRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            deps: TurnDeps {
                store,
                invoker,
                router,
                models,
                cache: Arc::new(HistoryCache::new(settings.history_cache_capacity)),
            },
            active: Arc::new(ActiveTurns::default()),
            settings,
        }
    }

    /// Start a turn and return its record stream.
    ///
    /// The per-thread slot is claimed before this returns, so a second call
    /// for the same thread fails immediately until the first turn's
    /// checkpoint is written.
    pub fn run_turn(&self, request: TurnRequest) -> Result<TurnStream, EngineError> {
        validate_thread_id(&request.thread_id)
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        if request.message.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }

        let Some(slot) = self.active.try_claim(&request.thread_id) else {
            tracing::info!(thread_id = %request.thread_id, "Rejected concurrent turn");
            return Err(EngineError::ConcurrentTurnRejected(request.thread_id));
        };

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let executor = TurnExecutor::new(
            request,
            self.deps.clone(),
            slot,
            tx,
            self.settings.turn_deadline,
        );
        tokio::spawn(executor.run());
        Ok(ReceiverStream::new(rx))
    }

    /// Whether a turn is currently running for `thread_id`
    pub fn is_busy(&self, thread_id: &str) -> bool {
        self.active.contains(thread_id)
    }

    /// Committed history for a thread; unknown threads are empty
    pub async fn history(&self, thread_id: &str) -> Result<CheckpointRecord, EngineError> {
        validate_thread_id(thread_id).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let record = self
            .deps
            .store
            .load(thread_id)
            .await
            .map_err(EngineError::Storage)?;
        Ok(record.unwrap_or_else(|| CheckpointRecord::empty(thread_id)))
    }

    /// Set or clear the model override used when a request names none
    pub async fn set_thread_model(
        &self,
        thread_id: &str,
        model: Option<&str>,
    ) -> Result<(), EngineError> {
        validate_thread_id(thread_id).map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let model = model.map(str::trim).filter(|m| !m.is_empty());
        self.deps
            .store
            .set_thread_model(thread_id, model)
            .await
            .map_err(EngineError::Storage)?;
        self.deps.cache.invalidate(thread_id);
        tracing::info!(thread_id = %thread_id, model = ?model, "Thread model override updated");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self, thread_id: &str) -> bool {
        self.deps.cache.contains(thread_id)
    }

    pub fn router(&self) -> &ToolRouter {
        &self.deps.router
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.deps.models
    }
}
