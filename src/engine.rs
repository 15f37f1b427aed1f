//! The engine facade: session ingestion, retrieval, answer streaming,
//! titling, and teardown.
//!
//! One engine instance serves every session of a deployment. Collaborators
//! sit behind the traits in [`crate::traits`], so the default constructor
//! wires up the HTTP implementations while tests inject deterministic
//! stand-ins through [`RagEngine::with_collaborators`].

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::answer::{self, ContextSource};
use crate::config::EngineConfig;
use crate::embedding::HttpEmbedder;
use crate::index::SessionIndex;
use crate::ingest;
use crate::llm::HttpChatModel;
use crate::models::{ConversationTurn, Intent, ScoredChunk};
use crate::router;
use crate::title;
use crate::traits::{ChatModel, Embedder, EmptyHistory, HistoryStore, WebSearch};
use crate::websearch::DuckDuckGo;

/// Cloning is cheap: clones share the collaborators and the per-session
/// lock map.
#[derive(Clone)]
pub struct RagEngine {
    config: EngineConfig,
    http: reqwest::Client,
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn WebSearch>,
    history: Arc<dyn HistoryStore>,
    /// One commit guard per session, so concurrent ingestions into the same
    /// session serialize while distinct sessions proceed in parallel.
    commit_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl RagEngine {
    /// Build an engine with the default HTTP collaborators.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let chat: Arc<dyn ChatModel> = Arc::new(HttpChatModel::new(config.llm.clone())?);
        let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(config.embedding.clone())?);
        let search: Arc<dyn WebSearch> = Arc::new(DuckDuckGo::new()?);
        Ok(Self::with_collaborators(
            config,
            chat,
            embedder,
            search,
            Arc::new(EmptyHistory),
        ))
    }

    /// Build an engine around caller-supplied collaborators.
    pub fn with_collaborators(
        config: EngineConfig,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        search: Arc<dyn WebSearch>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            chat,
            embedder,
            search,
            history,
            commit_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn commit_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.commit_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Ingest source references into a session's index. Returns whether the
    /// batch committed; failures are logged, never raised.
    pub async fn ingest(&self, refs: &[String], session_id: &str) -> bool {
        let lock = self.commit_lock(session_id).await;
        match ingest::run_ingest(
            &self.config,
            &self.http,
            &self.embedder,
            &lock,
            refs,
            session_id,
        )
        .await
        {
            Ok(chunks) => {
                debug!(session = session_id, chunks, "ingestion succeeded");
                true
            }
            Err(e) => {
                warn!(session = session_id, error = %e, "ingestion failed");
                false
            }
        }
    }

    /// Top-k chunks for a query against one session's index.
    ///
    /// Reloads the index from disk each call, so ingestions committed since
    /// the last query are visible immediately. A missing, unreadable, or
    /// unembeddable query yields no hits rather than an error.
    pub async fn retrieve(&self, query: &str, session_id: &str, k: usize) -> Vec<ScoredChunk> {
        let index = match SessionIndex::load(&self.config.index.root, session_id).await {
            Ok(Some(index)) => index,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(session = session_id, error = %e, "session index unreadable");
                return Vec::new();
            }
        };
        let query_vec = match self.embedder.embed(query).await {
            Ok(vec) => vec,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return Vec::new();
            }
        };
        index.search(&query_vec, k)
    }

    /// Answer a chat query, streaming fragments as the model produces them.
    ///
    /// The full route — classify, retrieve, grade, fall back to web search,
    /// synthesize — runs in a background task; dropping the returned stream
    /// cancels it at the next fragment.
    pub fn stream_answer(
        &self,
        query: impl Into<String>,
        session_id: impl Into<String>,
    ) -> ReceiverStream<String> {
        let engine = self.clone();
        let query = query.into();
        let session_id = session_id.into();
        let (tx, rx) = tokio::sync::mpsc::channel(32);

        tokio::spawn(async move {
            engine.answer_route(&query, &session_id, tx).await;
        });

        ReceiverStream::new(rx)
    }

    async fn answer_route(
        &self,
        query: &str,
        session_id: &str,
        tx: tokio::sync::mpsc::Sender<String>,
    ) {
        let history = self.recent_history(session_id).await;
        let routing_temp = self.config.llm.routing_temperature;
        let answer_temp = self.config.llm.answer_temperature;

        let intent = router::classify_intent(self.chat.as_ref(), query, routing_temp).await;
        if intent == Intent::Casual {
            debug!(session = session_id, "casual route");
            let messages = answer::casual_prompt(query, &history);
            answer::pump_answer(self.chat.as_ref(), &messages, answer_temp, tx).await;
            return;
        }

        let hits = self
            .retrieve(query, session_id, self.config.retrieval.top_k)
            .await;
        let (source, context) = if hits.is_empty() {
            debug!(session = session_id, "no session context; going to the web");
            self.web_context(query).await
        } else {
            let context = hits
                .iter()
                .map(|hit| hit.chunk.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let relevant = router::grade_relevance(
                self.chat.as_ref(),
                query,
                &context,
                self.config.retrieval.grade_context_chars,
                routing_temp,
            )
            .await;
            if relevant {
                info!(session = session_id, hits = hits.len(), "answering from session documents");
                (ContextSource::KnowledgeBase, context)
            } else {
                info!(session = session_id, "retrieved context judged irrelevant; going to the web");
                self.web_context(query).await
            }
        };

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let messages = answer::context_prompt(query, source, &context, &history, &today);
        answer::pump_answer(self.chat.as_ref(), &messages, answer_temp, tx).await;
    }

    /// Web-search context; a failed search still answers, with the failure
    /// itself as the context so the model can say so.
    async fn web_context(&self, query: &str) -> (ContextSource, String) {
        match self.search.search(query).await {
            Ok(results) => (ContextSource::WebSearch, results),
            Err(e) => {
                warn!(error = %e, "web search failed");
                (
                    ContextSource::WebSearch,
                    format!("Web search is currently unavailable: {}", e),
                )
            }
        }
    }

    /// Recent turns in chronological order. History failures degrade to an
    /// empty history.
    async fn recent_history(&self, session_id: &str) -> Vec<ConversationTurn> {
        match self
            .history
            .fetch_recent(session_id, self.config.retrieval.history_turns)
            .await
        {
            Ok(mut turns) => {
                turns.reverse();
                turns
            }
            Err(e) => {
                warn!(session = session_id, error = %e, "history fetch failed; answering without it");
                Vec::new()
            }
        }
    }

    /// Short display title for a session's first exchange.
    pub async fn title_for(&self, user_text: &str, bot_text: &str) -> String {
        title::title_for(
            self.chat.as_ref(),
            user_text,
            bot_text,
            self.config.llm.routing_temperature,
        )
        .await
    }

    /// Remove a session's index and its commit guard. Idempotent.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        SessionIndex::delete(&self.config.index.root, session_id).await?;
        self.commit_locks.lock().await.remove(session_id);
        info!(session = session_id, "session cleared");
        Ok(())
    }
}
