//! Core data types used throughout the engine.
//!
//! These types represent the documents, chunks, and conversation turns that
//! flow through the ingestion and answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of source a document was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Pdf,
    Text,
    Word,
    Spreadsheet,
    Presentation,
    Csv,
    Image,
    ImageUrl,
    WebPage,
}

/// Extracted text plus provenance, produced by the source loader.
///
/// Immutable once created; consumed by the chunker.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub content: String,
    /// Original reference (file path or URL) the text came from.
    pub source: String,
    pub kind: SourceKind,
}

/// The atomic retrievable unit stored in a session index.
///
/// Carries its source metadata and, once processed, a fixed-length
/// embedding vector. The `hash` is a SHA-256 of the chunk text and is used
/// to skip duplicate chunks on merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub kind: SourceKind,
    pub hash: String,
    pub embedding: Vec<f32>,
}

/// One prior exchange turn, read from the external history store.
///
/// Never written by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub is_user: bool,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Query intent as decided by the intent router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Small talk; answer from history alone.
    Casual,
    /// Information request; retrieve before answering.
    Query,
}

/// A chat message sent to the language model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A retrieved chunk paired with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub score: f32,
    pub chunk: Chunk,
}
