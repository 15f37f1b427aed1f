//! HTTP embedding client.
//!
//! Implements [`Embedder`] over two wire formats: an OpenAI-compatible
//! `POST /embeddings` endpoint and Ollama's `POST /api/embed`. Both use the
//! same retry strategy for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! The service is constructed once at startup and shared read-only by all
//! sessions; there is no process-wide global.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::traits::Embedder;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

pub struct HttpEmbedder {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        if config.provider == "openai" && config.api_key.is_none() {
            bail!("embedding.api_key required for the openai provider");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = match self.config.provider.as_str() {
                "openai" => self.send_openai(texts).await,
                _ => self.send_ollama(texts).await,
            };

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return match self.config.provider.as_str() {
                            "openai" => parse_openai_response(&json),
                            _ => parse_ollama_response(&json),
                        };
                    }
                    let body = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("embedding API error {}: {}", status, body));
                        continue;
                    }
                    bail!("embedding API error {}: {}", status, body);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed after retries")))
    }

    async fn send_openai(&self, texts: &[String]) -> reqwest::Result<reqwest::Response> {
        let url = self.config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        self.client
            .post(format!("{}/embeddings", url))
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "input": texts,
            }))
            .send()
            .await
    }

    async fn send_ollama(&self, texts: &[String]) -> reqwest::Result<reqwest::Response> {
        let url = self.config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
        self.client
            .post(format!("{}/api/embed", url))
            .json(&serde_json::json!({
                "model": self.config.model,
                "input": texts,
            }))
            .send()
            .await
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let mut vectors = self.request_batch(batch).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedding response count mismatch: sent {}, got {}",
                    batch.len(),
                    vectors.len()
                );
            }
            out.append(&mut vectors);
        }
        Ok(out)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding"))?;
        embeddings.push(to_f32_vec(embedding));
    }
    Ok(embeddings)
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let values = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: not an array"))?;
        result.push(to_f32_vec(values));
    }
    Ok(result)
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
