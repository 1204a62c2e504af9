//! Events that drive state transitions

use crate::db::Message;
use crate::llm::LlmErrorKind;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum Event {
    /// A new user message for this thread
    UserTurn { message: Message },

    /// A tool answered the turn
    ShortCircuit {
        reply: String,
        message_id: String,
        at: DateTime<Utc>,
    },

    /// No tool answered; the model will
    NoShortCircuit { message_id: String, at: DateTime<Utc> },

    Token { text: String },

    ModelCompleted,

    ModelFailed { kind: LlmErrorKind, message: String },

    Committed { version: i64 },

    CommitFailed { message: String },

    /// The client went away
    Aborted,

    DeadlineExceeded,
}

impl Event {
    pub fn model_failed(error: &crate::llm::LlmError) -> Self {
        Event::ModelFailed {
            kind: error.kind,
            message: error.message.clone(),
        }
    }
}
