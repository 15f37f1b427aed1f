//! Trait seams for the engine's external collaborators.
//!
//! The engine consumes four network services: a chat-capable language
//! model, an embedding service, a web search provider, and a conversation
//! history store. Each is a trait so that deployments can swap providers
//! and tests can substitute deterministic mocks.
//!
//! Built-in implementations:
//! - [`ChatModel`] → [`crate::llm::HttpChatModel`]
//! - [`Embedder`] → [`crate::embedding::HttpEmbedder`]
//! - [`WebSearch`] → [`crate::websearch::DuckDuckGo`]
//! - [`HistoryStore`] → [`EmptyHistory`] (for deployments without one)

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::models::{ChatMessage, ConversationTurn};

/// A chat-capable language model.
///
/// `complete` is used for the short deterministic calls (intent routing,
/// relevance grading, titling); `stream` drives answer synthesis.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One-shot completion; returns the full assistant message.
    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    /// Streaming completion; yields answer fragments as the model emits
    /// them. The stream is single-pass and forward-only.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>>;
}

/// A text-to-vector embedding service.
///
/// Shared read-only by all sessions; implementations must be safe for
/// unsynchronized concurrent calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, recorded in the index envelope so a model change
    /// is detectable on load.
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts; one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// A live web search provider, used when retrieval comes up empty or
/// irrelevant.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web and return result text usable as answer context.
    async fn search(&self, query: &str) -> Result<String>;
}

/// Read-only access to persisted conversation history.
///
/// Returns the most recent turns newest-first; the engine reverses them to
/// chronological order before use. The engine never writes history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn fetch_recent(&self, session_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;
}

/// A history store that always returns no turns.
pub struct EmptyHistory;

#[async_trait]
impl HistoryStore for EmptyHistory {
    async fn fetch_recent(&self, _session_id: &str, _limit: usize) -> Result<Vec<ConversationTurn>> {
        Ok(Vec::new())
    }
}
