//! Turn state types

use crate::db::Message;
use serde::Serialize;

/// Where a thread's current turn stands.
///
/// The user and assistant messages live only here until the turn commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// No turn in flight
    #[default]
    AwaitingTurn,

    /// Consulting the tool router
    Routing { user: Message },

    /// Receiving model tokens into a streaming assistant message
    Streaming { user: Message, assistant: Message },

    /// Reply sealed, checkpoint write pending
    Finalizing { user: Message, assistant: Message },
}

impl TurnState {
    pub fn name(&self) -> &'static str {
        match self {
            TurnState::AwaitingTurn => "awaiting_turn",
            TurnState::Routing { .. } => "routing",
            TurnState::Streaming { .. } => "streaming",
            TurnState::Finalizing { .. } => "finalizing",
        }
    }
}

/// Facts about the turn that do not change while it runs
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// Model resolved for this turn
    pub model: String,
}

impl TurnContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}
