//! Chat-model HTTP client for an OpenAI-compatible API.
//!
//! Covers the two call shapes the engine needs: a one-shot completion for
//! routing/grading/titling (with the same transient-error retry policy as
//! the embedding client) and an SSE streaming completion for answer
//! synthesis. Streaming fragments are pumped through a channel so the
//! caller gets a plain `Stream<Item = Result<String>>`; dropping the
//! consumer closes the channel and the pump stops on its next send.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::config::LlmConfig;
use crate::models::ChatMessage;
use crate::traits::ChatModel;

pub struct HttpChatModel {
    config: LlmConfig,
    client: reqwest::Client,
}

impl HttpChatModel {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            bail!("llm.api_key required (set GROQ_API_KEY or llm.api_key)");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        stream: bool,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "stream": stream,
        })
    }

    async fn send(
        &self,
        body: &serde_json::Value,
    ) -> reqwest::Result<reqwest::Response> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        self.client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = self.request_body(messages, temperature, false);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.send(&body).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }
                    let text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("chat API error {}: {}", status, text));
                        continue;
                    }
                    bail!("chat API error {}: {}", status, text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("chat completion failed after retries")))
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let body = self.request_body(messages, temperature, true);
        let response = self.send(&body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, text);
        }

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String>>(32);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut buffer = String::new();
            'read: while let Some(next) = bytes.next().await {
                let piece = match next {
                    Ok(piece) => piece,
                    Err(e) => {
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&piece));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    match parse_sse_line(&line) {
                        SseEvent::Fragment(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                // Consumer dropped the stream; stop pumping.
                                debug!("answer consumer gone, abandoning model stream");
                                break 'read;
                            }
                        }
                        SseEvent::Done => break 'read,
                        SseEvent::Ignore => {}
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("chat response missing choices[0].message.content"))
}

enum SseEvent {
    Fragment(String),
    Done,
    Ignore,
}

/// Decode one SSE line from a streaming chat response.
///
/// Lines look like `data: {json}` with a final `data: [DONE]` sentinel;
/// anything else (blank keep-alives, comments) is ignored. A data payload
/// without content (role prelude, finish chunk) is also ignored.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseEvent::Ignore;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseEvent::Done;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(payload) else {
        return SseEvent::Ignore;
    };
    match json
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
    {
        Some(content) if !content.is_empty() => SseEvent::Fragment(content.to_string()),
        _ => SseEvent::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_content() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Fendale."}}]
        });
        assert_eq!(parse_completion(&json).unwrap(), "Fendale.");
    }

    #[test]
    fn missing_content_is_error() {
        assert!(parse_completion(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn sse_fragment_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        match parse_sse_line(line) {
            SseEvent::Fragment(text) => assert_eq!(text, "Hel"),
            _ => panic!("expected fragment"),
        }
    }

    #[test]
    fn sse_done_and_noise_lines() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
        assert!(matches!(parse_sse_line(""), SseEvent::Ignore));
        assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Ignore));
        // Role prelude chunk has no content.
        let prelude = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_line(prelude), SseEvent::Ignore));
    }

    #[test]
    fn requires_api_key() {
        let config = LlmConfig::default();
        assert!(config.api_key.is_none());
        assert!(HttpChatModel::new(config).is_err());
    }
}
