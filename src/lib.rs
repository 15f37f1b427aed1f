//! # Session RAG
//!
//! A per-session retrieval-augmented answering engine.
//!
//! Session RAG ingests a user's documents (PDFs, Office files, images via
//! OCR, web pages) into an isolated per-session vector index, then answers
//! chat queries by routing each one through intent classification,
//! similarity retrieval, relevance grading, and a live web-search
//! fallback, streaming the synthesized answer fragment by fragment.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────────┐
//! │   Loader     │──▶│   Pipeline    │──▶│ Session index │
//! │ PDF/Office/  │   │ Chunk+Embed   │   │  (JSON file   │
//! │ OCR/Web      │   │               │   │  per session) │
//! └──────────────┘   └───────────────┘   └──────┬────────┘
//!                                               │
//!        query ──▶ classify ──▶ retrieve ──▶ grade ──▶ synthesize
//!                     │                        │            │
//!                   casual                web search     streamed
//!                    path                  fallback      fragments
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_rag::{config, engine::RagEngine};
//! use tokio_stream::StreamExt;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cfg = config::load_config(std::path::Path::new("engine.toml"))?;
//! let engine = RagEngine::new(cfg)?;
//!
//! engine.ingest(&["notes.pdf".to_string()], "session-1").await;
//!
//! let mut answer = engine.stream_answer("What do my notes say?", "session-1");
//! while let Some(fragment) = answer.next().await {
//!     print!("{fragment}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`traits`] | Collaborator trait seams |
//! | [`loader`] | Source classification and text extraction |
//! | [`extract`] | PDF and Office-format extractors |
//! | [`ocr`] | Image and scanned-PDF OCR |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding HTTP client and cosine similarity |
//! | [`index`] | Per-session persistent vector index |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`llm`] | Chat-model HTTP client (one-shot and streaming) |
//! | [`router`] | Intent classification and relevance grading |
//! | [`websearch`] | Web search fallback provider |
//! | [`answer`] | Prompt assembly and answer streaming |
//! | [`title`] | Conversation title generation |
//! | [`engine`] | The engine facade |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod ocr;
pub mod router;
pub mod title;
pub mod traits;
pub mod websearch;
