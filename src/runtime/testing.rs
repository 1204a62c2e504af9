//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::CheckpointStore;
use super::{ConversationEngine, EngineSettings, TurnRequest, TurnStream};
use crate::codec::StreamEvent;
use crate::db::{CheckpointRecord, Message};
use crate::llm::{LlmConfig, LlmError, ModelConfig, ModelInvoker, ModelRegistry, TokenStream};
use crate::tools::{ToolProfile, ToolRouter};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Model Invoker
// ============================================================================

/// What a mocked model call does
#[derive(Clone)]
pub enum Script {
    Tokens(Vec<String>),
    /// Yield tokens, then fail mid-stream
    FailAfter { tokens: Vec<String>, error: LlmError },
    /// Fail before any token
    OpenError(LlmError),
    /// Yield tokens, then finish only once the gate is notified
    Gated { tokens: Vec<String>, gate: Arc<Notify> },
    /// Yield tokens, then never finish
    Hang(Vec<String>),
}

impl Script {
    pub fn tokens(tokens: &[&str]) -> Self {
        Script::Tokens(tokens.iter().map(ToString::to_string).collect())
    }
}

/// One recorded call to the mock
#[derive(Clone)]
pub struct Invocation {
    pub model: String,
    pub history: Vec<Message>,
    pub cancel: CancellationToken,
}

/// Mock invoker that plays scripts, per model name or in queue order
#[derive(Default)]
pub struct MockModelInvoker {
    by_model: Mutex<HashMap<String, Script>>,
    queue: Mutex<VecDeque<Script>>,
    token_delay: Option<Duration>,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockModelInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before each token, so concurrent turns interleave
    #[must_use]
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Every call for `model` plays `script`
    pub fn script_for_model(&self, model: &str, script: Script) {
        self.by_model
            .lock()
            .unwrap()
            .insert(model.to_string(), script);
    }

    /// The next call not covered by a per-model script plays `script`
    pub fn queue(&self, script: Script) {
        self.queue.lock().unwrap().push_back(script);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelInvoker for MockModelInvoker {
    async fn stream(
        &self,
        history: &[Message],
        config: &ModelConfig,
        cancel: CancellationToken,
    ) -> Result<TokenStream, LlmError> {
        self.invocations.lock().unwrap().push(Invocation {
            model: config.model.clone(),
            history: history.to_vec(),
            cancel: cancel.clone(),
        });

        let script = self
            .by_model
            .lock()
            .unwrap()
            .get(&config.model)
            .cloned()
            .or_else(|| self.queue.lock().unwrap().pop_front())
            .unwrap_or_else(|| Script::tokens(&["mock reply"]));

        let (tokens, tail): (Vec<String>, Option<Result<String, LlmError>>) = match script {
            Script::OpenError(error) => return Err(error),
            Script::Tokens(tokens) => (tokens, None),
            Script::FailAfter { tokens, error } => (tokens, Some(Err(error))),
            Script::Gated { tokens, gate } => {
                let delay = self.token_delay;
                let head = paced(tokens, delay);
                let wait = futures::stream::once(async move {
                    tokio::select! {
                        () = gate.notified() => None,
                        () = cancel.cancelled() => Some(Err(LlmError::cancelled("cancelled"))),
                    }
                })
                .filter_map(|item| async move { item });
                return Ok(Box::pin(head.chain(wait)));
            }
            Script::Hang(tokens) => {
                let head = paced(tokens, self.token_delay);
                return Ok(Box::pin(head.chain(futures::stream::pending())));
            }
        };

        let head = paced(tokens, self.token_delay);
        Ok(Box::pin(head.chain(futures::stream::iter(tail))))
    }
}

fn paced(
    tokens: Vec<String>,
    delay: Option<Duration>,
) -> impl futures::Stream<Item = Result<String, LlmError>> + Send {
    futures::stream::iter(tokens).then(move |token| async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(token)
    })
}

// ============================================================================
// In-memory Checkpoint Store
// ============================================================================

/// Checkpoint store with the same version rules as the database
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    records: Mutex<HashMap<String, CheckpointRecord>>,
    fail_commits: AtomicBool,
    loads: AtomicUsize,
    load_pause: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// The next `load` reads its snapshot, signals the first notify, then
    /// returns only once the second is notified
    pub fn pause_next_load(&self) -> (Arc<Notify>, Arc<Notify>) {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.load_pause.lock().unwrap() = Some((reached.clone(), release.clone()));
        (reached, release)
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, thread_id: &str) -> Option<CheckpointRecord> {
        self.records.lock().unwrap().get(thread_id).cloned()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn commit(
        &self,
        thread_id: &str,
        messages: &[Message],
        expected_version: i64,
    ) -> Result<i64, String> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err("simulated write failure".to_string());
        }
        if messages.iter().any(Message::is_streaming) {
            return Err("streaming message in checkpoint".to_string());
        }
        let mut records = self.records.lock().unwrap();
        let record = records
            .entry(thread_id.to_string())
            .or_insert_with(|| CheckpointRecord::empty(thread_id));
        if record.version != expected_version {
            return Err(format!(
                "version conflict: expected {expected_version}, found {}",
                record.version
            ));
        }
        record.messages = messages.to_vec();
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(record.version)
    }

    async fn load(&self, thread_id: &str) -> Result<Option<CheckpointRecord>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let record = self.snapshot(thread_id);
        let pause = self.load_pause.lock().unwrap().take();
        if let Some((reached, release)) = pause {
            reached.notify_one();
            release.notified().await;
        }
        Ok(record)
    }

    async fn set_thread_model(&self, thread_id: &str, model: Option<&str>) -> Result<(), String> {
        self.records
            .lock()
            .unwrap()
            .entry(thread_id.to_string())
            .or_insert_with(|| CheckpointRecord::empty(thread_id))
            .model = model.map(ToString::to_string);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn test_registry() -> ModelRegistry {
    ModelRegistry::new(LlmConfig {
        api_key: Some("test-key".to_string()),
        base_url: "http://127.0.0.1:9/v1".to_string(),
        default_model: "test-model".to_string(),
        temperature: 0.7,
        max_tokens: None,
        models: vec!["test-model".to_string(), "other-model".to_string()],
    })
}

pub fn request(thread_id: &str, message: &str) -> TurnRequest {
    TurnRequest {
        thread_id: thread_id.to_string(),
        message: message.to_string(),
        model_name: None,
    }
}

/// Drain a turn stream, failing the test if it never terminates
pub async fn collect(stream: TurnStream) -> Vec<StreamEvent> {
    tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
        .await
        .expect("turn stream did not finish")
}

/// Concatenated chunk content of a finished turn
pub fn content_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Chunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// Engine wired to in-memory mocks
pub struct TestHarness {
    pub engine: Arc<ConversationEngine>,
    pub store: Arc<InMemoryCheckpointStore>,
    pub invoker: Arc<MockModelInvoker>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(MockModelInvoker::new(), EngineSettings::default())
    }

    pub fn build(invoker: MockModelInvoker, settings: EngineSettings) -> Self {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let invoker = Arc::new(invoker);
        let engine = Arc::new(ConversationEngine::new(
            store.clone(),
            invoker.clone(),
            Arc::new(ToolRouter::for_profile(ToolProfile::Development)),
            Arc::new(test_registry()),
            settings,
        ));
        Self {
            engine,
            store,
            invoker,
        }
    }

    /// Wait for a thread's slot to be released
    pub async fn wait_idle(&self, thread_id: &str) {
        for _ in 0..200 {
            if !self.engine.is_busy(thread_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("thread {thread_id} never became idle");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Engine Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, Role};
    use crate::runtime::{DatabaseStorage, EngineError};

    fn assert_single_terminal(events: &[StreamEvent]) {
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1, "events: {events:?}");
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_greeting_short_circuits_without_model() {
        let h = TestHarness::new();
        let events = collect(h.engine.run_turn(request("t1", "你好呀")).unwrap()).await;

        assert_eq!(
            events,
            vec![
                StreamEvent::chunk("你好！有什么我可以帮助你的吗？"),
                StreamEvent::End
            ]
        );
        assert!(h.invoker.invocations().is_empty());

        let record = h.store.snapshot("t1").unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[0].content(), "你好呀");
        assert_eq!(record.messages[1].content(), "你好！有什么我可以帮助你的吗？");
    }

    #[tokio::test]
    async fn test_model_turn_streams_then_commits() {
        let h = TestHarness::new();
        h.invoker.queue(Script::tokens(&["Hel", "lo"]));

        let events = collect(h.engine.run_turn(request("t1", "tell me a story")).unwrap()).await;
        assert_eq!(
            events,
            vec![StreamEvent::chunk("Hel"), StreamEvent::chunk("lo"), StreamEvent::End]
        );

        let record = h.store.snapshot("t1").unwrap();
        let [user, assistant] = record.messages.as_slice() else {
            panic!("expected two messages, got {:?}", record.messages);
        };
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content(), "tell me a story");
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.content(), "Hello");
        assert!(!assistant.is_streaming());
    }

    #[tokio::test]
    async fn test_model_sees_prior_turns() {
        let h = TestHarness::new();
        h.invoker.queue(Script::tokens(&["first answer"]));
        h.invoker.queue(Script::tokens(&["second answer"]));

        collect(h.engine.run_turn(request("t1", "first question")).unwrap()).await;
        collect(h.engine.run_turn(request("t1", "second question")).unwrap()).await;

        let calls = h.invoker.invocations();
        assert_eq!(calls.len(), 2);
        let contents: Vec<_> = calls[1].history.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["first question", "first answer", "second question"]);
        assert_eq!(h.store.snapshot("t1").unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_model_failure_discards_turn() {
        let h = TestHarness::new();
        h.invoker.queue(Script::FailAfter {
            tokens: vec!["par".to_string()],
            error: LlmError::server_error("upstream 502"),
        });

        let events = collect(h.engine.run_turn(request("t1", "question")).unwrap()).await;
        assert_single_terminal(&events);
        assert_eq!(events[0], StreamEvent::chunk("par"));
        assert!(matches!(
            &events[1],
            StreamEvent::Error { message } if message.contains("upstream 502")
        ));
        assert!(h.store.snapshot("t1").is_none());

        // The failed exchange is not part of the next turn's history
        h.invoker.queue(Script::tokens(&["ok"]));
        collect(h.engine.run_turn(request("t1", "retry")).unwrap()).await;
        let calls = h.invoker.invocations();
        let contents: Vec<_> = calls[1].history.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["retry"]);
    }

    #[tokio::test]
    async fn test_model_open_error_is_terminal_error() {
        let h = TestHarness::new();
        h.invoker.queue(Script::OpenError(LlmError::from_status(401, "bad key")));

        let events = collect(h.engine.run_turn(request("t1", "question")).unwrap()).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StreamEvent::Error { message } if !message.is_empty()));
        assert!(h.store.snapshot("t1").is_none());
    }

    #[tokio::test]
    async fn test_commit_failure_reloads_from_last_checkpoint() {
        let h = TestHarness::new();
        h.invoker.queue(Script::tokens(&["one"]));
        collect(h.engine.run_turn(request("t1", "q1")).unwrap()).await;
        assert_eq!(h.store.load_count(), 1);

        h.store.set_fail_commits(true);
        h.invoker.queue(Script::tokens(&["two"]));
        let events = collect(h.engine.run_turn(request("t1", "q2")).unwrap()).await;
        assert_single_terminal(&events);
        assert_eq!(events[0], StreamEvent::chunk("two"));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Error { message }) if message.contains("save")
        ));

        h.store.set_fail_commits(false);
        h.invoker.queue(Script::tokens(&["three"]));
        let events = collect(h.engine.run_turn(request("t1", "q3")).unwrap()).await;
        assert_eq!(events.last(), Some(&StreamEvent::End));
        assert_eq!(h.store.load_count(), 2, "history must be reloaded after a failed commit");

        let record = h.store.snapshot("t1").unwrap();
        let contents: Vec<_> = record.messages.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["q1", "one", "q3", "three"]);
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_concurrent_turn_on_same_thread_is_rejected() {
        let h = TestHarness::new();
        let gate = Arc::new(Notify::new());
        h.invoker.queue(Script::Gated {
            tokens: vec!["slow".to_string()],
            gate: gate.clone(),
        });

        let first = h.engine.run_turn(request("t1", "question one")).unwrap();
        let second = h.engine.run_turn(request("t1", "question two"));
        assert!(matches!(second, Err(EngineError::ConcurrentTurnRejected(id)) if id == "t1"));
        assert!(h.store.snapshot("t1").is_none());

        gate.notify_one();
        let events = collect(first).await;
        assert_eq!(events, vec![StreamEvent::chunk("slow"), StreamEvent::End]);
        assert_eq!(h.invoker.invocations().len(), 1);

        let record = h.store.snapshot("t1").unwrap();
        assert_eq!(record.messages[0].content(), "question one");
        assert!(h.engine.run_turn(request("t1", "question three")).is_ok());
    }

    #[tokio::test]
    async fn test_different_threads_stream_concurrently_with_own_models() {
        let h = TestHarness::build(
            MockModelInvoker::new().with_token_delay(Duration::from_millis(5)),
            EngineSettings::default(),
        );
        h.invoker.script_for_model("test-model", Script::tokens(&["A1", "A2", "A3"]));
        h.invoker.script_for_model("other-model", Script::tokens(&["B1", "B2", "B3"]));

        let mut a = request("thread-a", "question a");
        a.model_name = Some("test-model".to_string());
        let mut b = request("thread-b", "question b");
        b.model_name = Some("other-model".to_string());

        let stream_a = h.engine.run_turn(a).unwrap();
        let stream_b = h.engine.run_turn(b).unwrap();
        let (events_a, events_b) = tokio::join!(collect(stream_a), collect(stream_b));

        assert_eq!(content_of(&events_a), "A1A2A3");
        assert_eq!(content_of(&events_b), "B1B2B3");
        assert_eq!(events_a.last(), Some(&StreamEvent::End));
        assert_eq!(events_b.last(), Some(&StreamEvent::End));

        let mut models: Vec<_> = h.invoker.invocations().into_iter().map(|i| i.model).collect();
        models.sort();
        assert_eq!(models, vec!["other-model", "test-model"]);
        assert_eq!(h.store.snapshot("thread-a").unwrap().messages[1].content(), "A1A2A3");
        assert_eq!(h.store.snapshot("thread-b").unwrap().messages[1].content(), "B1B2B3");
    }

    #[tokio::test]
    async fn test_client_disconnect_cancels_model_and_skips_commit() {
        let h = TestHarness::new();
        h.invoker.queue(Script::Hang(vec!["partial".to_string()]));

        let mut stream = h.engine.run_turn(request("t1", "question")).unwrap();
        assert_eq!(stream.next().await, Some(StreamEvent::chunk("partial")));
        drop(stream);

        h.wait_idle("t1").await;
        let calls = h.invoker.invocations();
        assert!(calls[0].cancel.is_cancelled());
        assert!(h.store.snapshot("t1").is_none());
    }

    #[tokio::test]
    async fn test_turn_deadline() {
        let h = TestHarness::build(
            MockModelInvoker::new(),
            EngineSettings {
                turn_deadline: Some(Duration::from_millis(50)),
                ..EngineSettings::default()
            },
        );
        h.invoker.queue(Script::Hang(Vec::new()));

        let events = collect(h.engine.run_turn(request("t1", "question")).unwrap()).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            StreamEvent::Error { message } if message.contains("deadline")
        ));
        assert!(h.invoker.invocations()[0].cancel.is_cancelled());
        assert!(h.store.snapshot("t1").is_none());
    }

    #[tokio::test]
    async fn test_model_resolution_order() {
        let h = TestHarness::new();
        h.engine.set_thread_model("t1", Some("other-model")).await.unwrap();

        collect(h.engine.run_turn(request("t1", "q1")).unwrap()).await;
        let mut explicit = request("t1", "q2");
        explicit.model_name = Some("test-model".to_string());
        collect(h.engine.run_turn(explicit).unwrap()).await;
        collect(h.engine.run_turn(request("t2", "q3")).unwrap()).await;

        let models: Vec<_> = h.invoker.invocations().into_iter().map(|i| i.model).collect();
        assert_eq!(models, vec!["other-model", "test-model", "test-model"]);
        assert_eq!(
            h.store.snapshot("t1").unwrap().model.as_deref(),
            Some("other-model")
        );
    }

    #[tokio::test]
    async fn test_model_change_during_history_load_is_not_lost() {
        let h = TestHarness::new();
        let (reached, release) = h.store.pause_next_load();

        let first = h.engine.run_turn(request("t1", "q1")).unwrap();
        reached.notified().await;
        h.engine.set_thread_model("t1", Some("other-model")).await.unwrap();
        release.notify_one();
        assert_eq!(collect(first).await.last(), Some(&StreamEvent::End));
        assert!(!h.engine.is_cached("t1"));

        collect(h.engine.run_turn(request("t1", "q2")).unwrap()).await;
        let models: Vec<_> = h.invoker.invocations().into_iter().map(|i| i.model).collect();
        assert_eq!(models, vec!["test-model", "other-model"]);

        let invocations = h.invoker.invocations();
        let contents: Vec<_> = invocations[1]
            .history
            .iter()
            .map(Message::content)
            .collect();
        assert_eq!(contents, vec!["q1", "mock reply", "q2"]);
    }

    #[tokio::test]
    async fn test_idle_threads_leave_the_history_cache() {
        let h = TestHarness::build(
            MockModelInvoker::new(),
            EngineSettings {
                history_cache_capacity: 1,
                ..EngineSettings::default()
            },
        );

        collect(h.engine.run_turn(request("a", "q1")).unwrap()).await;
        assert!(h.engine.is_cached("a"));
        collect(h.engine.run_turn(request("b", "q2")).unwrap()).await;
        assert!(!h.engine.is_cached("a"));
        assert!(h.engine.is_cached("b"));
        assert_eq!(h.store.load_count(), 2);

        // An evicted thread reloads its committed history
        collect(h.engine.run_turn(request("a", "q3")).unwrap()).await;
        assert_eq!(h.store.load_count(), 3);
        let history = &h.invoker.invocations()[2].history;
        let contents: Vec<_> = history.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["q1", "mock reply", "q3"]);
        assert!(!h.engine.is_cached("b"));
    }

    #[tokio::test]
    async fn test_zero_capacity_cache_always_loads() {
        let h = TestHarness::build(
            MockModelInvoker::new(),
            EngineSettings {
                history_cache_capacity: 0,
                ..EngineSettings::default()
            },
        );

        for question in ["q1", "q2", "q3"] {
            collect(h.engine.run_turn(request("t1", question)).unwrap()).await;
            assert!(!h.engine.is_cached("t1"));
        }
        assert_eq!(h.store.load_count(), 3);
        assert_eq!(h.store.snapshot("t1").unwrap().version, 3);
    }

    #[tokio::test]
    async fn test_slot_is_free_once_end_is_seen() {
        let h = TestHarness::new();
        h.invoker.queue(Script::tokens(&["ok"]));

        let mut stream = h.engine.run_turn(request("t1", "question")).unwrap();
        while let Some(event) = stream.next().await {
            if event == StreamEvent::End {
                break;
            }
        }
        assert!(h.engine.run_turn(request("t1", "next")).is_ok());
    }

    #[tokio::test]
    async fn test_disabled_tool_falls_through_to_model() {
        let h = TestHarness::new();
        assert!(h.engine.router().set_enabled("specific_reply", false));
        h.invoker.queue(Script::tokens(&["model says hi"]));

        let events = collect(h.engine.run_turn(request("t1", "你好")).unwrap()).await;
        assert_eq!(content_of(&events), "model says hi");
        assert_eq!(h.invoker.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_up_front() {
        let h = TestHarness::new();
        assert!(matches!(
            h.engine.run_turn(request("t1", "   ")),
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.engine.run_turn(request("", "hello")),
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(!h.engine.is_busy("t1"));
    }

    #[tokio::test]
    async fn test_history_survives_engine_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat_history.db");

        let build = |db: Database, invoker: Arc<MockModelInvoker>| {
            ConversationEngine::new(
                Arc::new(DatabaseStorage::new(db)),
                invoker,
                Arc::new(ToolRouter::for_profile(ToolProfile::Development)),
                Arc::new(test_registry()),
                EngineSettings::default(),
            )
        };

        {
            let invoker = Arc::new(MockModelInvoker::new());
            invoker.queue(Script::tokens(&["persisted"]));
            let engine = build(Database::open(&path).unwrap(), invoker);
            let events = collect(engine.run_turn(request("t1", "remember this")).unwrap()).await;
            assert_eq!(events.last(), Some(&StreamEvent::End));
        }

        let invoker = Arc::new(MockModelInvoker::new());
        let engine = build(Database::open(&path).unwrap(), invoker.clone());
        let record = engine.history("t1").await.unwrap();
        assert_eq!(record.version, 1);
        let contents: Vec<_> = record.messages.iter().map(Message::content).collect();
        assert_eq!(contents, vec!["remember this", "persisted"]);

        collect(engine.run_turn(request("t1", "and now?")).unwrap()).await;
        assert_eq!(invoker.invocations()[0].history.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_thread_history_is_empty() {
        let h = TestHarness::new();
        let record = h.engine.history("never-seen").await.unwrap();
        assert_eq!(record.version, 0);
        assert!(record.messages.is_empty());
    }
}
