//! Ingestion pipeline orchestration.
//!
//! Fans source references out to the loader over a bounded worker pool,
//! then chunks the collected documents, embeds every chunk, and commits
//! the batch to the session's index in one write. Per-source failures are
//! isolated: an unreadable ref contributes nothing but never aborts the
//! batch.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::config::EngineConfig;
use crate::index::{content_hash, SessionIndex};
use crate::loader;
use crate::models::{Chunk, SourceDocument};
use crate::traits::Embedder;

/// Run one ingestion batch for a session. Returns the number of chunks
/// committed.
///
/// Preconditions: non-empty session id and a non-empty ref list; violations
/// fail fast with no side effects. The final load-merge-save runs under
/// `commit_lock`, the session's single-writer guard.
pub async fn run_ingest(
    config: &EngineConfig,
    http: &reqwest::Client,
    embedder: &Arc<dyn Embedder>,
    commit_lock: &Mutex<()>,
    refs: &[String],
    session_id: &str,
) -> Result<usize> {
    if session_id.trim().is_empty() {
        bail!("session id must not be empty");
    }
    if refs.is_empty() {
        bail!("no sources to ingest");
    }

    let documents = load_sources(config, http, refs).await;
    info!(
        session = session_id,
        refs = refs.len(),
        documents = documents.len(),
        "sources loaded"
    );

    let chunks = build_chunks(config, embedder, &documents).await?;
    if chunks.is_empty() {
        bail!("no usable content in any source");
    }

    let committed = chunks.len();
    commit(config, embedder, commit_lock, session_id, chunks).await?;
    info!(session = session_id, chunks = committed, "ingestion committed");
    Ok(committed)
}

/// Load every ref concurrently through a bounded pool with a per-source
/// timeout. Completion order is not preserved across sources; chunk order
/// within one source follows that source's document order.
async fn load_sources(
    config: &EngineConfig,
    http: &reqwest::Client,
    refs: &[String],
) -> Vec<SourceDocument> {
    let semaphore = Arc::new(Semaphore::new(config.ingest.workers));
    let timeout = std::time::Duration::from_secs(config.ingest.source_timeout_secs);
    let mut tasks = JoinSet::new();

    for reference in refs {
        let semaphore = Arc::clone(&semaphore);
        let http = http.clone();
        let reference = reference.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            match tokio::time::timeout(timeout, loader::load(&http, &reference)).await {
                Ok(docs) => docs,
                Err(_) => {
                    warn!(reference, "source load timed out");
                    Vec::new()
                }
            }
        });
    }

    let mut documents = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(mut docs) => documents.append(&mut docs),
            Err(e) => warn!(error = %e, "loader task panicked"),
        }
    }
    documents
}

/// Chunk each document and embed every chunk, preserving per-document
/// chunk order and carrying source metadata onto each chunk.
async fn build_chunks(
    config: &EngineConfig,
    embedder: &Arc<dyn Embedder>,
    documents: &[SourceDocument],
) -> Result<Vec<Chunk>> {
    let mut texts = Vec::new();
    let mut provenance = Vec::new();

    for doc in documents {
        for window in chunk_text(
            &doc.content,
            config.chunking.window_chars,
            config.chunking.overlap_chars,
        ) {
            texts.push(window);
            provenance.push((doc.source.clone(), doc.kind));
        }
    }
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != texts.len() {
        bail!(
            "embedding count mismatch: {} chunks, {} vectors",
            texts.len(),
            vectors.len()
        );
    }
    // A wrong-width vector would poison every later similarity search, so
    // it fails the batch here instead of reaching the index.
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dims()) {
        bail!(
            "embedding dimension mismatch: expected {}, got {}",
            embedder.dims(),
            bad.len()
        );
    }

    Ok(texts
        .into_iter()
        .zip(vectors)
        .zip(provenance)
        .map(|((text, embedding), (source, kind))| Chunk {
            id: Uuid::new_v4().to_string(),
            hash: content_hash(&text),
            text,
            source,
            kind,
            embedding,
        })
        .collect())
}

/// Commit the batch: merge into the existing index when readable, rebuild
/// from scratch when it is corrupt or was built by a different embedding
/// model. The rebuild discards prior content, so it is surfaced loudly.
async fn commit(
    config: &EngineConfig,
    embedder: &Arc<dyn Embedder>,
    commit_lock: &Mutex<()>,
    session_id: &str,
    chunks: Vec<Chunk>,
) -> Result<()> {
    let _guard = commit_lock.lock().await;
    let root = &config.index.root;

    let mut index = match SessionIndex::load(root, session_id).await {
        Ok(Some(existing)) if existing.model == embedder.model_name() => existing,
        Ok(Some(existing)) => {
            warn!(
                session = session_id,
                stored_model = %existing.model,
                current_model = %embedder.model_name(),
                discarded_chunks = existing.chunks.len(),
                "embedding model changed; rebuilding session index from this batch only"
            );
            SessionIndex::new(embedder.model_name())
        }
        Ok(None) => SessionIndex::new(embedder.model_name()),
        Err(e) => {
            warn!(
                session = session_id,
                error = %e,
                "existing session index unreadable; rebuilding from this batch only (prior content lost)"
            );
            SessionIndex::new(embedder.model_name())
        }
    };

    index.merge(chunks);
    index.save(root, session_id).await
}
