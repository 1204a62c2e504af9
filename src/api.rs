//! HTTP API
//!
//! `POST /api/chat` streams one turn as NDJSON; the remaining routes read
//! history and adjust per-thread and per-tool settings.

mod handlers;
mod ndjson;
mod types;

pub use handlers::create_router;
pub use types::*;

use crate::runtime::ConversationEngine;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
}

impl AppState {
    pub fn new(engine: ConversationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
