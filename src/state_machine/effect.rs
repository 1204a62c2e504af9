//! Effects produced by state transitions

use crate::db::Message;

/// Side effects the executor performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the tool router for a short-circuit reply
    RouteTool { text: String },

    /// Open the model stream
    InvokeModel,

    /// Forward a piece of the reply to the client
    EmitChunk { content: String },

    /// Append the finished turn to the checkpoint
    Commit { user: Message, assistant: Message },

    /// Forget cached history so the next turn reloads it
    InvalidateHistory,

    /// Cancel the in-flight model call
    AbortModel,

    EmitEnd,

    EmitError { message: String },
}

impl Effect {
    pub fn chunk(content: impl Into<String>) -> Self {
        Effect::EmitChunk {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Effect::EmitError {
            message: message.into(),
        }
    }

    /// Whether this effect ends the client stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Effect::EmitEnd | Effect::EmitError { .. })
    }
}
