//! HTTP request handlers

use super::ndjson::{ndjson_record, ndjson_stream};
use super::types::{
    ChatRequest, ErrorResponse, ModelsResponse, SetModelRequest, SuccessResponse,
    ThreadMessagesResponse, ToolsResponse,
};
use super::AppState;
use crate::codec::StreamEvent;
use crate::runtime::{EngineError, TurnRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Turns
        .route("/api/chat", post(chat))
        // Threads
        .route("/api/threads/:id/messages", get(get_messages))
        .route("/api/threads/:id/model", put(set_thread_model))
        // Settings
        .route("/api/models", get(list_models))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name/enable", post(enable_tool))
        .route("/api/tools/:name/disable", post(disable_tool))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Turns
// ============================================================

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let request = TurnRequest {
        thread_id: req.thread_id,
        message: req.message,
        model_name: req.model_name,
    };

    match state.engine.run_turn(request) {
        Ok(stream) => Ok(ndjson_stream(stream)),
        Err(EngineError::ConcurrentTurnRejected(thread_id)) => Ok(ndjson_record(
            StatusCode::CONFLICT,
            &StreamEvent::error(format!(
                "A reply is still being generated for thread {thread_id}, try again when it finishes"
            )),
        )),
        Err(EngineError::InvalidRequest(msg)) => Err(AppError::BadRequest(msg)),
        Err(e @ EngineError::Storage(_)) => Err(AppError::Internal(e.to_string())),
    }
}

// ============================================================
// Threads
// ============================================================

async fn get_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadMessagesResponse>, AppError> {
    let record = state.engine.history(&thread_id).await?;
    Ok(Json(ThreadMessagesResponse {
        thread_id: record.thread_id,
        version: record.version,
        model: record.model,
        messages: record.messages,
    }))
}

async fn set_thread_model(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<SetModelRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .engine
        .set_thread_model(&thread_id, req.model_name.as_deref())
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Settings
// ============================================================

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = state.engine.models();
    Json(ModelsResponse {
        models: models.available_models(),
        default: models.default_model_id().to_string(),
    })
}

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.engine.router().describe(),
    })
}

async fn enable_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    toggle_tool(&state, &name, true)
}

async fn disable_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    toggle_tool(&state, &name, false)
}

fn toggle_tool(
    state: &AppState,
    name: &str,
    enabled: bool,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.engine.router().set_enabled(name, enabled) {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(AppError::NotFound(format!("Unknown tool: {name}")))
    }
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("turnstile ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidRequest(msg) => AppError::BadRequest(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
