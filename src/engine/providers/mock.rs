// Praxis Engine — Mock Provider
//
// Deterministic offline backend, selected whenever no API key is
// configured. The response is a pure function of the last user message:
// it re-mentions every tag the user wrote and always proposes one strategy
// and one outcome tag, so the assistant-side tag extraction, discover
// events and outcome linkage stay exercised end to end without a network.

use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;

use crate::atoms::traits::{ChatTurn, LlmProvider, ProviderError, TextStream};
use crate::atoms::types::Role;
use crate::engine::tags::extract_tags;

/// Words per emitted chunk — small enough to exercise multi-chunk streams.
const CHUNK_WORDS: usize = 6;

pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        MockProvider
    }

    /// Compose the canned response for the last user turn.
    fn compose(turns: &[ChatTurn]) -> String {
        let last_user = turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .unwrap_or("");
        let tags = extract_tags(last_user);

        if tags.is_empty() {
            return "I can help you reason about a teaching situation. Describe the topic, \
                    what you observed, and any constraints, and tag the key pieces like \
                    [[topic:fractions]] so I can connect them to past experience."
                .to_string();
        }

        let mentioned: Vec<String> = tags
            .iter()
            .map(|t| format!("[[{}:{}]]", t.entity_type, t.name))
            .collect();

        format!(
            "Thinking about {}: one approach worth trying here is \
             [[strategy:think-pair-share]] — give students a minute alone before \
             they compare answers. In similar situations that pairing has pointed \
             toward [[outcome:improved understanding]]. Keep the task narrow and \
             check in after the first attempt.",
            mentioned.join(" and ")
        )
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat_stream(
        &self,
        _system: &str,
        turns: &[ChatTurn],
    ) -> Result<TextStream, ProviderError> {
        info!("[provider] Mock provider serving deterministic response");
        let response = Self::compose(turns);
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let words: Vec<&str> = response.split(' ').collect();
            for chunk in words.chunks(CHUNK_WORDS) {
                let mut text = chunk.join(" ");
                text.push(' ');
                if tx.send(Ok(text)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}
