// Praxis Engine — AI Provider Registry
// AnyProvider wraps Box<dyn LlmProvider> so adding a new provider never
// requires modifying the factory enum — just implement the trait.

pub mod anthropic;
pub mod mock;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;

use crate::atoms::traits::{ChatTurn, LlmProvider, ProviderError, TextStream};
use crate::engine::config::EngineConfig;

/// Which backend a config resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    /// Deterministic offline provider, used whenever no API key is
    /// configured. Keeps the whole turn pipeline exercisable without a
    /// network or a key — the absence of an LLM must never crash the
    /// engine.
    Mock,
}

/// Type-erased provider. Callers hold `AnyProvider` and call
/// `.chat_stream()` without knowing which concrete backend is in use.
pub struct AnyProvider(Box<dyn LlmProvider>);

impl AnyProvider {
    /// Construct the right concrete provider from an `EngineConfig`.
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => AnyProvider(Box::new(
                AnthropicProvider::new(key, config.model.clone(), config.base_url.clone()),
            )),
            _ => AnyProvider(Box::new(MockProvider::new())),
        }
    }

    pub fn mock() -> Self {
        AnyProvider(Box::new(MockProvider::new()))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn kind(&self) -> ProviderKind {
        if self.0.name() == "anthropic" {
            ProviderKind::Anthropic
        } else {
            ProviderKind::Mock
        }
    }

    /// Open a streaming completion.
    pub async fn chat_stream(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> Result<TextStream, ProviderError> {
        self.0.chat_stream(system, turns).await
    }
}
