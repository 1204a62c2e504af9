//! Turnstile - streaming chat turn engine
//!
//! Runs one conversational turn at a time per thread: a user message is
//! either answered by a short-circuit tool or streamed from an
//! OpenAI-compatible model, and the exchange is checkpointed to SQLite once
//! it completes.

pub mod api;
pub mod codec;
pub mod config;
pub mod db;
pub mod llm;
pub mod runtime;
pub mod state_machine;
pub mod tools;
