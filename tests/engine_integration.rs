//! End-to-end tests for the answering engine.
//!
//! These tests run the real ingestion pipeline and routing state machine
//! against deterministic collaborator stand-ins: a scripted chat model, a
//! word-bag embedder, and a canned web search provider.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use session_rag::config::EngineConfig;
use session_rag::engine::RagEngine;
use session_rag::models::ChatMessage;
use session_rag::traits::{ChatModel, Embedder, EmptyHistory, WebSearch};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ─── Scripted chat model ────────────────────────────────────────────

/// Answers routing, grading, and titling calls from a script, and records
/// the prompt of every streaming call for later assertions.
struct ScriptedChat {
    intent_reply: &'static str,
    grade_reply: &'static str,
    title_reply: Option<&'static str>,
    fragments: Vec<&'static str>,
    streamed_prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    fn new(intent: &'static str, grade: &'static str) -> Self {
        Self {
            intent_reply: intent,
            grade_reply: grade,
            title_reply: Some("A Short Title"),
            fragments: vec!["Fendale", " is the capital."],
            streamed_prompts: Mutex::new(Vec::new()),
        }
    }

    fn last_streamed_system(&self) -> String {
        let prompts = self.streamed_prompts.lock().unwrap();
        prompts.last().unwrap()[0].content.clone()
    }

    fn last_streamed_user(&self) -> String {
        let prompts = self.streamed_prompts.lock().unwrap();
        prompts.last().unwrap().last().unwrap().content.clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        let system = &messages[0].content;
        if system.contains("intent classifier") {
            Ok(self.intent_reply.to_string())
        } else if system.contains("retrieved context") {
            Ok(self.grade_reply.to_string())
        } else if system.contains("short title") {
            self.title_reply
                .map(|t| t.to_string())
                .ok_or_else(|| anyhow::anyhow!("title model down"))
        } else {
            anyhow::bail!("unexpected completion prompt: {}", system)
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>> {
        self.streamed_prompts.lock().unwrap().push(messages.to_vec());
        let fragments: Vec<Result<String>> =
            self.fragments.iter().map(|f| Ok(f.to_string())).collect();
        Ok(futures_util::stream::iter(fragments).boxed())
    }
}

// ─── Word-bag embedder ──────────────────────────────────────────────

const DIMS: usize = 32;

/// Hashes lowercase words into a fixed-size bag-of-words vector, so texts
/// sharing vocabulary score high cosine similarity.
struct WordBagEmbedder {
    calls: AtomicUsize,
}

impl WordBagEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMS];
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            vector[(hasher.finish() as usize) % DIMS] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for WordBagEmbedder {
    fn model_name(&self) -> &str {
        "word-bag"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

// ─── Canned web search ──────────────────────────────────────────────

struct CannedSearch {
    results: Option<&'static str>,
    calls: AtomicUsize,
}

impl CannedSearch {
    fn returning(results: &'static str) -> Self {
        Self {
            results: Some(results),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            results: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WebSearch for CannedSearch {
    async fn search(&self, _query: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .map(|r| r.to_string())
            .ok_or_else(|| anyhow::anyhow!("search backend unreachable"))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

struct Fixture {
    engine: RagEngine,
    chat: Arc<ScriptedChat>,
    embedder: Arc<WordBagEmbedder>,
    search: Arc<CannedSearch>,
    _tmp: TempDir,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn fixture(chat: ScriptedChat, search: CannedSearch) -> Fixture {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.index.root = tmp.path().join("indexes");

    let chat = Arc::new(chat);
    let embedder = Arc::new(WordBagEmbedder::new());
    let search = Arc::new(search);
    let engine = RagEngine::with_collaborators(
        config,
        chat.clone(),
        embedder.clone(),
        search.clone(),
        Arc::new(EmptyHistory),
    );
    Fixture {
        engine,
        chat,
        embedder,
        search,
        _tmp: tmp,
    }
}

fn write_doc(tmp: &TempDir, name: &str, content: &str) -> String {
    let path = tmp.path().join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

async fn collect(mut stream: tokio_stream::wrappers::ReceiverStream<String>) -> String {
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        answer.push_str(&fragment);
    }
    answer
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_then_answer_from_documents() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let doc = write_doc(
        &f._tmp,
        "notes.txt",
        "The capital of Laurania is Fendale. Fendale sits on the Zorvath river.",
    );

    assert!(f.engine.ingest(&[doc], "session-a").await);

    let query = "What is the capital of Laurania?";
    let answer = collect(f.engine.stream_answer(query, "session-a")).await;
    assert_eq!(answer, "Fendale is the capital.");

    // The synthesis prompt carried the retrieved chunk, its source label,
    // and the literal query.
    let system = f.chat.last_streamed_system();
    assert!(system.contains("The capital of Laurania is Fendale."));
    assert!(system.contains("Knowledge Base"));
    assert_eq!(f.chat.last_streamed_user(), query);

    // Relevant session context means no web call.
    assert_eq!(f.search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn casual_route_skips_retrieval_and_search() {
    let f = fixture(ScriptedChat::new("CASUAL", "yes"), CannedSearch::returning("unused"));

    let answer = collect(f.engine.stream_answer("hey, how are you?", "session-a")).await;
    assert!(!answer.is_empty());

    assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.search.calls.load(Ordering::SeqCst), 0);
    assert!(f.chat.last_streamed_system().contains("friendly"));
}

#[tokio::test]
async fn empty_index_falls_back_to_web() {
    let f = fixture(
        ScriptedChat::new("QUERY", "yes"),
        CannedSearch::returning("Fendale: capital of Laurania since 1820."),
    );

    collect(f.engine.stream_answer("capital of Laurania?", "fresh-session")).await;

    assert_eq!(f.search.calls.load(Ordering::SeqCst), 1);
    let system = f.chat.last_streamed_system();
    assert!(system.contains("Web Search"));
    assert!(system.contains("capital of Laurania since 1820"));
}

#[tokio::test]
async fn irrelevant_context_falls_back_to_web() {
    let f = fixture(
        ScriptedChat::new("QUERY", "no"),
        CannedSearch::returning("Fendale weather: mild."),
    );
    let doc = write_doc(
        &f._tmp,
        "recipes.txt",
        "Whisk the eggs, fold in the flour, and bake for forty minutes.",
    );
    assert!(f.engine.ingest(&[doc], "session-a").await);

    collect(f.engine.stream_answer("weather in Fendale?", "session-a")).await;

    assert_eq!(f.search.calls.load(Ordering::SeqCst), 1);
    assert!(f.chat.last_streamed_system().contains("Web Search"));
}

#[tokio::test]
async fn web_search_failure_still_answers() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::failing());

    let answer = collect(f.engine.stream_answer("anything?", "fresh-session")).await;
    assert!(!answer.is_empty());

    let system = f.chat.last_streamed_system();
    assert!(system.contains("Web search is currently unavailable"));
}

#[tokio::test]
async fn failed_ingest_leaves_existing_index_untouched() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let doc = write_doc(&f._tmp, "notes.txt", "The capital of Laurania is Fendale.");
    assert!(f.engine.ingest(&[doc], "session-a").await);

    let index_path = session_rag::index::session_path(
        &f.engine.config().index.root,
        "session-a",
    );
    let before = std::fs::read(&index_path).unwrap();

    // A batch with nothing readable fails without touching the index.
    let missing = f._tmp.path().join("does-not-exist.txt");
    let refs = vec![missing.to_string_lossy().into_owned()];
    assert!(!f.engine.ingest(&refs, "session-a").await);

    let after = std::fs::read(&index_path).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn empty_ref_list_is_rejected_without_side_effects() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let doc = write_doc(&f._tmp, "notes.txt", "The capital of Laurania is Fendale.");
    assert!(f.engine.ingest(&[doc], "session-a").await);

    let root = &f.engine.config().index.root;
    let index_path = session_rag::index::session_path(root, "session-a");
    let before = std::fs::read(&index_path).unwrap();

    assert!(!f.engine.ingest(&[], "session-a").await);
    assert_eq!(before, std::fs::read(&index_path).unwrap());

    // Nor does a session that never ingested gain an index file.
    assert!(!f.engine.ingest(&[], "fresh-session").await);
    assert!(!session_rag::index::session_path(root, "fresh-session").exists());
}

#[tokio::test]
async fn corrupt_index_is_rebuilt_from_the_new_batch() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let root = f.engine.config().index.root.clone();
    std::fs::create_dir_all(&root).unwrap();
    let index_path = session_rag::index::session_path(&root, "session-a");
    std::fs::write(&index_path, b"{ not json").unwrap();

    let doc = write_doc(&f._tmp, "notes.txt", "The capital of Laurania is Fendale.");
    assert!(f.engine.ingest(&[doc], "session-a").await);

    // The unreadable file was replaced by an index of the new batch.
    let hits = f.engine.retrieve("capital of Laurania", "session-a", 5).await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.text.contains("Fendale"));
}

#[tokio::test]
async fn sessions_are_isolated() {
    let f = fixture(
        ScriptedChat::new("QUERY", "yes"),
        CannedSearch::returning("web fallback text"),
    );
    let doc = write_doc(&f._tmp, "notes.txt", "The capital of Laurania is Fendale.");
    assert!(f.engine.ingest(&[doc], "session-a").await);

    // Another session sees none of it.
    let hits = f.engine.retrieve("capital of Laurania", "session-b", 5).await;
    assert!(hits.is_empty());

    collect(f.engine.stream_answer("capital of Laurania?", "session-b")).await;
    assert_eq!(f.search.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn later_ingests_merge_instead_of_overwriting() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let doc_a = write_doc(&f._tmp, "a.txt", "The capital of Laurania is Fendale.");
    let doc_b = write_doc(&f._tmp, "b.txt", "The Zorvath river freezes every winter.");

    assert!(f.engine.ingest(&[doc_a], "session-a").await);
    assert!(f.engine.ingest(&[doc_b], "session-a").await);

    // A query matching only the first document still finds it.
    let hits = f
        .engine
        .retrieve("What is the capital of Laurania?", "session-a", 1)
        .await;
    assert_eq!(hits.len(), 1);
    assert!(hits[0].chunk.text.contains("Fendale"));
}

#[tokio::test]
async fn clear_session_removes_the_index() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let doc = write_doc(&f._tmp, "notes.txt", "The capital of Laurania is Fendale.");
    assert!(f.engine.ingest(&[doc], "session-a").await);

    f.engine.clear_session("session-a").await.unwrap();
    let hits = f.engine.retrieve("capital", "session-a", 5).await;
    assert!(hits.is_empty());

    // Idempotent.
    f.engine.clear_session("session-a").await.unwrap();
}

/// Claims one dimensionality but produces another.
struct MiswiredEmbedder;

#[async_trait]
impl Embedder for MiswiredEmbedder {
    fn model_name(&self) -> &str {
        "miswired"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![0.0; 4]; texts.len()])
    }
}

#[tokio::test]
async fn wrong_width_vectors_never_reach_the_index() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.index.root = tmp.path().join("indexes");
    let engine = RagEngine::with_collaborators(
        config,
        Arc::new(ScriptedChat::new("QUERY", "yes")),
        Arc::new(MiswiredEmbedder),
        Arc::new(CannedSearch::returning("unused")),
        Arc::new(EmptyHistory),
    );

    let doc = write_doc(&tmp, "notes.txt", "The capital of Laurania is Fendale.");
    assert!(!engine.ingest(&[doc], "session-a").await);
    let index_path =
        session_rag::index::session_path(&engine.config().index.root, "session-a");
    assert!(!index_path.exists());
}

#[tokio::test]
async fn title_falls_back_to_message_prefix_when_model_fails() {
    let mut chat = ScriptedChat::new("QUERY", "yes");
    chat.title_reply = None;
    let f = fixture(chat, CannedSearch::returning("unused"));

    let user = "Tell me everything about the history of the Laurania region";
    let title = f.engine.title_for(user, "It began in 1820...").await;
    assert_eq!(title, user.chars().take(30).collect::<String>());
}

#[tokio::test]
async fn titles_come_from_the_model_when_it_answers() {
    let f = fixture(ScriptedChat::new("QUERY", "yes"), CannedSearch::returning("unused"));
    let title = f.engine.title_for("u", "b").await;
    assert_eq!(title, "A Short Title");
}
