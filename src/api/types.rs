//! API request and response types

use crate::db::Message;
use crate::tools::ToolStatus;
use serde::{Deserialize, Serialize};

/// Request to run one turn
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub thread_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
}

/// Committed history of a thread
#[derive(Debug, Serialize)]
pub struct ThreadMessagesResponse {
    pub thread_id: String,
    pub version: i64,
    pub model: Option<String>,
    pub messages: Vec<Message>,
}

/// Request to set or clear a thread's model override
#[derive(Debug, Deserialize)]
pub struct SetModelRequest {
    #[serde(default)]
    pub model_name: Option<String>,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub default: String,
}

/// Response for tool list
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolStatus>,
}

/// Response for settings actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
