// Praxis Engine — Anthropic Claude Provider
// Implements the LlmProvider golden trait.
// All Claude-specific SSE event parsing and retry logic lives here.

use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::atoms::traits::{ChatTurn, LlmProvider, ProviderError, TextStream};
use crate::atoms::types::Role;

/// Attempts beyond the first request.
pub(crate) const MAX_RETRIES: u32 = 3;

/// Buffered chunks between the reader task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

/// Exponential backoff, capped, honoring a server-provided Retry-After.
pub(crate) async fn retry_delay(attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let delay = match retry_after_secs {
        Some(secs) => Duration::from_secs(secs.min(30)),
        None => Duration::from_millis((500u64 << attempt.min(4)).min(8_000)),
    };
    tokio::time::sleep(delay).await;
    delay
}

pub(crate) fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Struct ─────────────────────────────────────────────────────────────────

pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: String, base_url: Option<String>) -> Self {
        AnthropicProvider {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_default(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.to_string(),
            model,
        }
    }

    fn format_turns(turns: &[ChatTurn]) -> Vec<Value> {
        turns
            .iter()
            .filter(|t| t.role != Role::System)
            .map(|t| {
                json!({
                    "role": match t.role {
                        Role::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": t.content,
                })
            })
            .collect()
    }

    /// Pull the text delta out of one SSE event, if it carries one.
    fn parse_sse_text(data: &str) -> Option<String> {
        let v: Value = serde_json::from_str(data).ok()?;
        match v["type"].as_str()? {
            "content_block_delta" => {
                let delta = &v["delta"];
                if delta["type"].as_str() == Some("text_delta") {
                    delta["text"].as_str().map(|s| s.to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Open the HTTP stream with retry + error classification.
    async fn open_stream(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "system": system,
            "messages": Self::format_turns(turns),
            "max_tokens": 8192,
            "stream": true,
        });

        info!("[provider] Anthropic request to {} model={}", url, self.model);

        let mut last_error = String::new();
        let mut last_status: u16 = 0;
        let mut retry_after: Option<u64> = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = retry_delay(attempt - 1, retry_after.take()).await;
                warn!(
                    "[provider] Anthropic retry {}/{} after {}ms",
                    attempt,
                    MAX_RETRIES,
                    delay.as_millis()
                );
            }

            let response = match self
                .client
                .post(&url)
                .header("anthropic-version", "2023-06-01")
                .header("x-api-key", &self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("HTTP request failed: {}", e);
                    last_status = 0;
                    if attempt < MAX_RETRIES {
                        continue;
                    }
                    return Err(ProviderError::Transport(last_error));
                }
            };

            if !response.status().is_success() {
                let status = response.status().as_u16();
                last_status = status;
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body_text = response.text().await.unwrap_or_default();
                last_error = format!("API error {}: {}", status, truncate(&body_text, 200));
                error!("[provider] Anthropic error {}: {}", status, truncate(&body_text, 500));

                // Auth errors are never retried
                if status == 401 || status == 403 {
                    return Err(ProviderError::Auth(last_error));
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    continue;
                }
                return if status == 429 {
                    Err(ProviderError::RateLimited {
                        message: last_error,
                        retry_after_secs: retry_after.take(),
                    })
                } else {
                    Err(ProviderError::Api { status, message: last_error })
                };
            }

            return Ok(response);
        }

        // All retries exhausted — classify the last error
        match last_status {
            0 => Err(ProviderError::Transport(last_error)),
            429 => Err(ProviderError::RateLimited {
                message: last_error,
                retry_after_secs: retry_after,
            }),
            s => Err(ProviderError::Api { status: s, message: last_error }),
        }
    }
}

// ── LlmProvider trait implementation ───────────────────────────────────────

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat_stream(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> Result<TextStream, ProviderError> {
        let response = self.open_stream(system, turns).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(result) = byte_stream.next().await {
                let bytes = match result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::Transport(format!(
                                "Stream read error: {}",
                                e
                            ))))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Some(text) = Self::parse_sse_text(data) {
                            // Receiver dropped means the turn was cancelled.
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
