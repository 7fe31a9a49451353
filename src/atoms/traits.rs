// ── Praxis Atoms: Provider Trait ───────────────────────────────────────────
// The golden trait every language-model backend implements, plus the
// provider-level error taxonomy. Wire-format specifics (SSE parsing,
// retries, backoff) live in engine/providers/*.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::types::Role;

/// One turn of conversation history handed to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Provider failures, classified so callers can decide on retry/surface.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No API key configured for this provider.
    #[error("provider not configured")]
    NotConfigured,

    /// Authentication rejected; never retried.
    #[error("auth error: {0}")]
    Auth(String),

    /// 429 after retries were exhausted.
    #[error("rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: Option<u64> },

    /// Non-retryable API error or retries exhausted.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection / stream-read failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Receiving half of a provider token stream. Each item is a text chunk or
/// a mid-stream failure; the channel closing marks end of stream.
pub type TextStream = mpsc::Receiver<Result<String, ProviderError>>;

/// A streaming chat backend. Implementations start the request, then feed
/// text chunks through the returned channel as they arrive, so the caller
/// can interleave its own events and observe cancellation between chunks.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs ("anthropic", "mock"…).
    fn name(&self) -> &str;

    /// Open a streaming completion for `system` + `turns`.
    /// Errors returned here mean the stream never started; errors sent
    /// through the channel mean it died mid-flight.
    async fn chat_stream(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> Result<TextStream, ProviderError>;
}
