//! Pure state transition function

use super::{Effect, Event, TurnContext, TurnState};
use crate::db::Message;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A turn is already in flight for this thread")]
    TurnInFlight,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function. Given the same inputs it always produces the
/// same outputs; ids and timestamps arrive inside events.
pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Turn start
        // ============================================================
        (TurnState::AwaitingTurn, Event::UserTurn { message }) => {
            let text = message.content().to_string();
            Ok(TransitionResult::new(TurnState::Routing { user: message })
                .with_effect(Effect::RouteTool { text }))
        }

        (_, Event::UserTurn { .. }) => Err(TransitionError::TurnInFlight),

        // ============================================================
        // Routing
        // ============================================================
        (
            TurnState::Routing { user },
            Event::ShortCircuit {
                reply,
                message_id,
                at,
            },
        ) => {
            let assistant = Message::assistant(message_id, reply.clone(), at);
            let mut result = TransitionResult::new(TurnState::Finalizing {
                user: user.clone(),
                assistant: assistant.clone(),
            });
            if !reply.is_empty() {
                result = result.with_effect(Effect::chunk(reply));
            }
            Ok(result.with_effect(Effect::Commit {
                user: user.clone(),
                assistant,
            }))
        }

        (TurnState::Routing { user }, Event::NoShortCircuit { message_id, at }) => {
            Ok(TransitionResult::new(TurnState::Streaming {
                user: user.clone(),
                assistant: Message::assistant_streaming(message_id, at),
            })
            .with_effect(Effect::InvokeModel))
        }

        // ============================================================
        // Streaming
        // ============================================================
        (TurnState::Streaming { user, assistant }, Event::Token { text }) => {
            if text.is_empty() {
                return Ok(TransitionResult::new(state.clone()));
            }
            let mut assistant = assistant.clone();
            assistant.append(&text);
            Ok(TransitionResult::new(TurnState::Streaming {
                user: user.clone(),
                assistant,
            })
            .with_effect(Effect::chunk(text)))
        }

        (TurnState::Streaming { user, assistant }, Event::ModelCompleted) => {
            let assistant = assistant.clone().seal();
            Ok(TransitionResult::new(TurnState::Finalizing {
                user: user.clone(),
                assistant: assistant.clone(),
            })
            .with_effect(Effect::Commit {
                user: user.clone(),
                assistant,
            }))
        }

        // Working copy is dropped; nothing from this turn is committed
        (TurnState::Streaming { .. }, Event::ModelFailed { message, .. }) => {
            Ok(TransitionResult::new(TurnState::AwaitingTurn)
                .with_effect(Effect::error(format!("Model request failed: {message}"))))
        }

        // ============================================================
        // Abandoning a turn before it is finalized
        // ============================================================
        (TurnState::Routing { .. } | TurnState::Streaming { .. }, Event::Aborted) => {
            Ok(TransitionResult::new(TurnState::AwaitingTurn)
                .with_effect(Effect::AbortModel)
                .with_effect(Effect::error("Turn aborted")))
        }

        (TurnState::Routing { .. } | TurnState::Streaming { .. }, Event::DeadlineExceeded) => {
            Ok(TransitionResult::new(TurnState::AwaitingTurn)
                .with_effect(Effect::AbortModel)
                .with_effect(Effect::error(format!(
                    "Turn for model {} exceeded its deadline",
                    context.model
                ))))
        }

        // ============================================================
        // Finalizing
        // ============================================================
        (TurnState::Finalizing { .. }, Event::Committed { .. }) => {
            Ok(TransitionResult::new(TurnState::AwaitingTurn).with_effect(Effect::EmitEnd))
        }

        (TurnState::Finalizing { .. }, Event::CommitFailed { message }) => {
            Ok(TransitionResult::new(TurnState::AwaitingTurn)
                .with_effect(Effect::InvalidateHistory)
                .with_effect(Effect::error(format!(
                    "Failed to save conversation: {message}"
                ))))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}
