//! Model invocation
//!
//! A turn's history goes to a chat-completion backend and comes back as a
//! lazy, cancellable stream of tokens.

mod error;
mod openai;
mod registry;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiCompatInvoker;
pub use registry::{LlmConfig, ModelRegistry, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use types::{ModelConfig, TokenStream};

use crate::db::Message;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Streams a completion for `history` using the model named in `config`.
///
/// Implementations must stop producing tokens promptly once `cancel` fires.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn stream(
        &self,
        history: &[Message],
        config: &ModelConfig,
        cancel: CancellationToken,
    ) -> Result<TokenStream, LlmError>;
}

#[async_trait]
impl<T: ModelInvoker + ?Sized> ModelInvoker for Arc<T> {
    async fn stream(
        &self,
        history: &[Message],
        config: &ModelConfig,
        cancel: CancellationToken,
    ) -> Result<TokenStream, LlmError> {
        (**self).stream(history, config, cancel).await
    }
}

/// Logging wrapper for model invokers
pub struct LoggingInvoker {
    inner: Arc<dyn ModelInvoker>,
}

impl LoggingInvoker {
    pub fn new(inner: Arc<dyn ModelInvoker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ModelInvoker for LoggingInvoker {
    async fn stream(
        &self,
        history: &[Message],
        config: &ModelConfig,
        cancel: CancellationToken,
    ) -> Result<TokenStream, LlmError> {
        let start = Instant::now();
        let model = config.model.clone();
        tracing::debug!(model = %model, messages = history.len(), "Model request started");

        let tokens = match self.inner.stream(history, config, cancel).await {
            Ok(tokens) => tokens,
            Err(e) if e.is_cancelled() => {
                tracing::debug!(model = %model, "Model request cancelled before response");
                return Err(e);
            }
            Err(e) => {
                tracing::error!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Model request failed"
                );
                return Err(e);
            }
        };

        let count = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicBool::new(false));
        let logged = tokens.inspect({
            let count = Arc::clone(&count);
            let failed = Arc::clone(&failed);
            let model = model.clone();
            move |item| match item {
                Ok(_) => {
                    if count.fetch_add(1, Ordering::Relaxed) == 0 {
                        tracing::debug!(
                            model = %model,
                            first_token_ms = %start.elapsed().as_millis(),
                            "Model produced first token"
                        );
                    }
                }
                Err(e) if e.is_cancelled() => {
                    failed.store(true, Ordering::Relaxed);
                    tracing::debug!(
                        model = %model,
                        tokens = count.load(Ordering::Relaxed),
                        "Model stream cancelled"
                    );
                }
                Err(e) => {
                    failed.store(true, Ordering::Relaxed);
                    tracing::warn!(
                        model = %model,
                        tokens = count.load(Ordering::Relaxed),
                        error = %e.message,
                        kind = ?e.kind,
                        "Model stream failed"
                    );
                }
            }
        });

        let finished = futures::stream::once(async move {
            if !failed.load(Ordering::Relaxed) {
                tracing::info!(
                    model = %model,
                    duration_ms = %start.elapsed().as_millis(),
                    tokens = count.load(Ordering::Relaxed),
                    "Model stream completed"
                );
            }
        })
        .filter_map(|()| async { None::<Result<String, LlmError>> });

        Ok(Box::pin(logged.chain(finished)))
    }
}
