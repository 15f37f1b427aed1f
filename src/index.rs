//! Per-session persistent vector index.
//!
//! Each session owns one JSON index file under the configured root,
//! addressed as a pure function of the session identifier: the file name
//! embeds the hex encoding of the identifier's bytes, which is injective,
//! so two distinct sessions can never map to the same file.
//!
//! The envelope records a format version and the embedding model name so
//! that a model change or format bump is detectable on load instead of
//! silently producing nonsense similarities.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, ScoredChunk};

pub const INDEX_VERSION: u32 = 1;

/// Storage location for a session's index. Pure function of the inputs.
pub fn session_path(root: &Path, session_id: &str) -> PathBuf {
    root.join(format!("session_{}.json", hex::encode(session_id.as_bytes())))
}

/// SHA-256 hex digest of a chunk's text, used for merge dedup.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionIndex {
    pub version: u32,
    /// Embedding model the stored vectors came from.
    pub model: String,
    pub chunks: Vec<Chunk>,
}

impl SessionIndex {
    pub fn new(model: &str) -> Self {
        Self {
            version: INDEX_VERSION,
            model: model.to_string(),
            chunks: Vec::new(),
        }
    }

    /// Load a session's index. `Ok(None)` when no index exists;
    /// `Err` when a file exists but cannot be read or parsed.
    pub async fn load(root: &Path, session_id: &str) -> Result<Option<Self>> {
        let path = session_path(root, session_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let index: SessionIndex = serde_json::from_slice(&bytes)
                    .with_context(|| format!("corrupt index at {}", path.display()))?;
                Ok(Some(index))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("unreadable index at {}", path.display())),
        }
    }

    /// Persist the index, creating the root directory if needed.
    pub async fn save(&self, root: &Path, session_id: &str) -> Result<()> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("could not create index root {}", root.display()))?;
        let path = session_path(root, session_id);
        let json = serde_json::to_vec(self)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("could not write index {}", path.display()))?;
        Ok(())
    }

    /// Append new chunks, skipping any whose text hash is already present.
    /// Never removes existing chunks.
    pub fn merge(&mut self, new_chunks: Vec<Chunk>) {
        let existing: std::collections::HashSet<String> =
            self.chunks.iter().map(|c| c.hash.clone()).collect();
        for chunk in new_chunks {
            if !existing.contains(&chunk.hash) {
                self.chunks.push(chunk);
            }
        }
    }

    /// Top-k chunks by cosine similarity to the query vector, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                score: cosine_similarity(query, &chunk.embedding),
                chunk: chunk.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Delete a session's index file. Idempotent: deleting a missing index
    /// is not an error.
    pub async fn delete(root: &Path, session_id: &str) -> Result<()> {
        let path = session_path(root, session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("could not delete index {}", path.display())),
        }
    }
}
