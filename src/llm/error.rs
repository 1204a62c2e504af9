//! Model invocation failures

use thiserror::Error;

/// What went wrong with a model call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connect, timeout or body read failure
    Network,
    RateLimit,
    /// 5xx, or an error object inside the stream
    ServerError,
    Auth,
    InvalidRequest,
    /// The turn gave up on the call; not a backend fault
    Cancelled,
    Unknown,
}

impl LlmErrorKind {
    /// Kind implied by a non-success HTTP status
    pub fn for_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            400 => Self::InvalidRequest,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }

    /// Error for a rejected request, `body` being the backend's explanation
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = LlmErrorKind::for_status(status);
        let message = match kind {
            LlmErrorKind::Auth => format!("Authentication failed: {body}"),
            LlmErrorKind::RateLimit => format!("Rate limit exceeded: {body}"),
            LlmErrorKind::InvalidRequest => format!("Invalid request: {body}"),
            LlmErrorKind::ServerError => format!("Server error: {body}"),
            _ => format!("HTTP {status}: {body}"),
        };
        Self::new(kind, message)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == LlmErrorKind::Cancelled
    }
}
