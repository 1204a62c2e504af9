//! Turn executor
//!
//! Drives one turn through the state machine, performing effects and
//! feeding the resulting events back in until a terminal record is sent.

use super::{TurnDeps, TurnRequest, TurnSlot};
use crate::codec::StreamEvent;
use crate::db::{CheckpointRecord, Message};
use crate::llm::{LlmErrorKind, ModelConfig, TokenStream};
use crate::state_machine::{transition, Effect, Event, TurnContext, TurnState};
use chrono::Utc;
use futures::StreamExt;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) struct TurnExecutor {
    request: TurnRequest,
    deps: TurnDeps,
    /// Held until the turn's outcome is settled
    slot: Option<TurnSlot>,
    events_tx: mpsc::Sender<StreamEvent>,
    deadline: Option<Instant>,
    state: TurnState,
    cancel: CancellationToken,
    tokens: Option<TokenStream>,
    terminated: bool,
}

impl TurnExecutor {
    pub(crate) fn new(
        request: TurnRequest,
        deps: TurnDeps,
        slot: TurnSlot,
        events_tx: mpsc::Sender<StreamEvent>,
        turn_deadline: Option<Duration>,
    ) -> Self {
        Self {
            request,
            deps,
            slot: Some(slot),
            events_tx,
            deadline: turn_deadline.map(|d| Instant::now() + d),
            state: TurnState::AwaitingTurn,
            cancel: CancellationToken::new(),
            tokens: None,
            terminated: false,
        }
    }

    pub(crate) async fn run(mut self) {
        let thread_id = self.request.thread_id.clone();

        let base = match self.load_base().await {
            Ok(base) => base,
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "Failed to load checkpoint");
                self.finish(StreamEvent::error(format!("Failed to load conversation: {e}")))
                    .await;
                return;
            }
        };

        let model = self
            .deps
            .models
            .resolve(self.request.model_name.as_deref(), base.model.as_deref());
        let model_config = self.deps.models.config_for(&model);
        let context = TurnContext::new(model.as_str());
        tracing::info!(
            thread_id = %thread_id,
            model = %model,
            base_version = base.version,
            "Turn started"
        );

        let user = Message::user(
            Uuid::new_v4().to_string(),
            self.request.message.clone(),
            Utc::now(),
        );
        let mut pending = VecDeque::from([Event::UserTurn { message: user }]);

        // Process events in a loop - no recursion
        loop {
            let event = match pending.pop_front() {
                Some(event) => event,
                None if matches!(self.state, TurnState::Streaming { .. }) => {
                    self.next_model_event().await
                }
                None => break,
            };

            let result = match transition(&self.state, &context, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(
                        thread_id = %thread_id,
                        state = self.state.name(),
                        error = %e,
                        "Rejected turn event"
                    );
                    self.abort_model();
                    self.finish(StreamEvent::error(format!("Internal error: {e}")))
                        .await;
                    return;
                }
            };

            tracing::trace!(
                thread_id = %thread_id,
                from = self.state.name(),
                to = result.new_state.name(),
                "Turn transition"
            );
            self.state = result.new_state;

            for effect in result.effects {
                if let Some(next) = self.execute_effect(effect, &base, &model_config).await {
                    pending.push_back(next);
                }
            }
        }

        if !self.terminated {
            tracing::error!(thread_id = %thread_id, "Turn stopped without a terminal record");
            self.finish(StreamEvent::error("Turn ended unexpectedly")).await;
        }
    }

    async fn load_base(&mut self) -> Result<CheckpointRecord, String> {
        let thread_id = &self.request.thread_id;
        if let Some(record) = self.deps.cache.get(thread_id) {
            return Ok(record);
        }
        let generation = self.deps.cache.generation();
        let record = self
            .deps
            .store
            .load(thread_id)
            .await?
            .unwrap_or_else(|| CheckpointRecord::empty(thread_id.as_str()));
        self.deps.cache.insert_loaded(record.clone(), generation);
        Ok(record)
    }

    async fn execute_effect(
        &mut self,
        effect: Effect,
        base: &CheckpointRecord,
        model_config: &ModelConfig,
    ) -> Option<Event> {
        match effect {
            Effect::RouteTool { text } => Some(self.route(&text).await),
            Effect::InvokeModel => self.open_model_stream(base, model_config).await,
            Effect::EmitChunk { content } => {
                self.send(StreamEvent::Chunk { content }).await;
                None
            }
            Effect::Commit { user, assistant } => Some(self.commit(base, user, assistant).await),
            Effect::InvalidateHistory => {
                self.deps.cache.invalidate(&base.thread_id);
                None
            }
            Effect::AbortModel => {
                self.abort_model();
                None
            }
            Effect::EmitEnd => {
                self.finish(StreamEvent::End).await;
                None
            }
            Effect::EmitError { message } => {
                self.finish(StreamEvent::Error { message }).await;
                None
            }
        }
    }

    async fn route(&mut self, text: &str) -> Event {
        let reply = tokio::select! {
            biased;
            () = self.events_tx.closed() => return Event::Aborted,
            () = deadline_elapsed(self.deadline) => return Event::DeadlineExceeded,
            reply = self.deps.router.try_short_circuit(text) => reply,
        };

        let message_id = Uuid::new_v4().to_string();
        match reply {
            Some(reply) => Event::ShortCircuit {
                reply,
                message_id,
                at: Utc::now(),
            },
            None => Event::NoShortCircuit {
                message_id,
                at: Utc::now(),
            },
        }
    }

    async fn open_model_stream(
        &mut self,
        base: &CheckpointRecord,
        config: &ModelConfig,
    ) -> Option<Event> {
        let mut history = base.messages.clone();
        if let TurnState::Streaming { user, .. } = &self.state {
            history.push(user.clone());
        }

        let invoke = self
            .deps
            .invoker
            .stream(&history, config, self.cancel.clone());
        let opened = tokio::select! {
            biased;
            () = self.events_tx.closed() => return Some(Event::Aborted),
            () = deadline_elapsed(self.deadline) => return Some(Event::DeadlineExceeded),
            opened = invoke => opened,
        };

        match opened {
            Ok(tokens) => {
                self.tokens = Some(tokens);
                None
            }
            Err(e) => Some(Event::model_failed(&e)),
        }
    }

    async fn next_model_event(&mut self) -> Event {
        let Some(tokens) = self.tokens.as_mut() else {
            return Event::ModelFailed {
                kind: LlmErrorKind::Unknown,
                message: "model stream is not open".to_string(),
            };
        };

        let event = tokio::select! {
            biased;
            () = self.events_tx.closed() => Event::Aborted,
            () = deadline_elapsed(self.deadline) => Event::DeadlineExceeded,
            next = tokens.next() => match next {
                Some(Ok(text)) => Event::Token { text },
                Some(Err(e)) => Event::model_failed(&e),
                None => Event::ModelCompleted,
            },
        };

        if matches!(event, Event::ModelCompleted | Event::ModelFailed { .. }) {
            self.tokens = None;
        }
        event
    }

    async fn commit(
        &mut self,
        base: &CheckpointRecord,
        user: Message,
        assistant: Message,
    ) -> Event {
        let mut messages = base.messages.clone();
        messages.push(user);
        messages.push(assistant);

        match self
            .deps
            .store
            .commit(&base.thread_id, &messages, base.version)
            .await
        {
            Ok(version) => {
                tracing::info!(thread_id = %base.thread_id, version, "Turn committed");
                self.deps
                    .cache
                    .record_commit(&base.thread_id, messages, version);
                Event::Committed { version }
            }
            Err(message) => {
                tracing::error!(
                    thread_id = %base.thread_id,
                    error = %message,
                    "Checkpoint write failed"
                );
                Event::CommitFailed { message }
            }
        }
    }

    fn abort_model(&mut self) {
        self.cancel.cancel();
        // Dropping the stream drops the response body
        self.tokens = None;
    }

    async fn send(&mut self, event: StreamEvent) {
        if self.events_tx.send(event).await.is_err() {
            tracing::debug!(thread_id = %self.request.thread_id, "Client gone, dropping record");
        }
    }

    /// Send the single terminal record. The slot is released first so the
    /// client can start its next turn as soon as it sees the record.
    async fn finish(&mut self, event: StreamEvent) {
        if self.terminated {
            tracing::warn!(thread_id = %self.request.thread_id, "Ignoring second terminal record");
            return;
        }
        self.terminated = true;
        self.tokens = None;
        drop(self.slot.take());

        let outcome = if event == StreamEvent::End { "end" } else { "error" };
        tracing::info!(thread_id = %self.request.thread_id, outcome, "Turn finished");
        self.send(event).await;
    }
}
