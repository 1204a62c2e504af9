//! Streaming client for OpenAI-compatible chat completion endpoints

use super::{LlmError, ModelConfig, ModelInvoker, TokenStream};
use crate::db::{Message, Role};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DONE_SENTINEL: &str = "[DONE]";

/// Invoker for any endpoint speaking the `/chat/completions` SSE protocol
pub struct OpenAiCompatInvoker {
    client: Client,
}

impl OpenAiCompatInvoker {
    pub fn new() -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn translate_request<'a>(
        history: &'a [Message],
        config: &'a ModelConfig,
    ) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &config.model,
            messages: history
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: m.content(),
                })
                .collect(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: true,
        }
    }
}

fn classify_send_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::network(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        LlmError::network(format!("Connection failed: {e}"))
    } else {
        LlmError::unknown(format!("Request failed: {e}"))
    }
}

/// Interpret one SSE `data:` payload. `Ok(None)` means nothing to emit.
fn parse_chunk(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::unknown(format!("Failed to parse stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(LlmError::server_error(format!("Stream error: {}", error.message)));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

struct TokenState<S> {
    events: S,
    cancel: CancellationToken,
    finished: bool,
}

/// Turn SSE events into tokens. Ends at `[DONE]` or end of body; yields a
/// `Cancelled` error if `cancel` fires first. Nothing is yielded after an error.
fn token_stream<S, E>(
    events: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<String, LlmError>>
where
    S: Stream<Item = Result<eventsource_stream::Event, E>> + Unpin,
    E: std::fmt::Display,
{
    let state = TokenState {
        events,
        cancel,
        finished: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            let next = tokio::select! {
                biased;
                () = state.cancel.cancelled() => {
                    state.finished = true;
                    return Some((Err(LlmError::cancelled("Model stream cancelled")), state));
                }
                next = state.events.next() => next,
            };

            let event = match next {
                None => return None,
                Some(Err(e)) => {
                    state.finished = true;
                    let err = LlmError::network(format!("Stream read failed: {e}"));
                    return Some((Err(err), state));
                }
                Some(Ok(event)) => event,
            };

            if event.data.trim() == DONE_SENTINEL {
                return None;
            }
            match parse_chunk(&event.data) {
                Ok(Some(token)) => return Some((Ok(token), state)),
                Ok(None) => {}
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
}

#[async_trait]
impl ModelInvoker for OpenAiCompatInvoker {
    async fn stream(
        &self,
        history: &[Message],
        config: &ModelConfig,
        cancel: CancellationToken,
    ) -> Result<TokenStream, LlmError> {
        let request = Self::translate_request(history, config);
        let send = self
            .client
            .post(config.endpoint())
            .bearer_auth(&config.api_key)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(LlmError::cancelled("Request cancelled before response"));
            }
            result = send => result.map_err(|e| classify_send_error(&e))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read error body: {e}")))?;
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or(body, |resp| resp.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let events = Box::pin(response.bytes_stream().eventsource());
        Ok(Box::pin(token_stream(events, cancel)))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}
