//! Re-index workflow: turns a note-content-changed event into a fresh
//! generation of chunks and embeddings.
//!
//! The workflow is a pipeline of idempotent stages:
//!
//! 1. Delete the note's existing chunks (embeddings cascade). Re-running
//!    against an already-empty set is a no-op.
//! 2. Chunk the new content. Zero chunks is terminal success; an empty
//!    note has nothing to retrieve.
//! 3. Embed all chunk texts, splitting into multiple calls when the batch
//!    exceeds the provider's limit. Every returned vector is validated
//!    against the model's declared dimensionality; a mismatch is fatal for
//!    this note and nothing is persisted.
//! 4. Persist all chunks then all embeddings in one transaction.
//!
//! Transient failures (provider timeouts, store unavailability) are retried
//! with exponential backoff up to a small fixed bound. After exhaustion the
//! note is left either with its previous generation (if the delete had not
//! yet run) or with zero chunks: temporarily unsearchable, never stale.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunker::{self, ChunkerOptions};
use crate::embedding::EmbeddingClient;
use crate::models::{Chunk, Embedding, NoteChange};
use crate::store::ChunkStore;
use crate::token::TokenEstimator;

/// Default bound on workflow attempts (first try + retries).
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Errors surfaced by the re-index workflow.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The embedding provider failed (timeout, quota, malformed response).
    #[error("embedding provider error: {0}")]
    Provider(anyhow::Error),

    /// The provider returned a vector of the wrong length. Fatal: corrupt
    /// vectors are never persisted and the attempt is not retried.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The chunk store failed.
    #[error("chunk store error: {0}")]
    Store(anyhow::Error),
}

impl IndexError {
    /// Whether retrying the workflow could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, IndexError::DimensionMismatch { .. })
    }
}

/// Result of a completed re-index.
#[derive(Debug, Clone)]
pub struct ReindexOutcome {
    /// Chunks persisted for this generation (0 for empty content).
    pub chunks_indexed: usize,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
}

/// Orchestrates delete → chunk → embed → persist for one note at a time.
pub struct Indexer<S: ChunkStore> {
    store: Arc<S>,
    embedder: Arc<dyn EmbeddingClient>,
    options: ChunkerOptions,
    tokens: TokenEstimator,
    batch_size: usize,
    max_attempts: u32,
}

impl<S: ChunkStore> Indexer<S> {
    pub fn new(
        store: Arc<S>,
        embedder: Arc<dyn EmbeddingClient>,
        options: ChunkerOptions,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            options,
            tokens: TokenEstimator::default(),
            batch_size,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Run the workflow with bounded retry and exponential backoff.
    ///
    /// Safe to invoke repeatedly for the same note (at-least-once delivery):
    /// each attempt replaces the whole generation, so the last completed run
    /// wins.
    pub async fn reindex(&self, change: &NoteChange) -> Result<ReindexOutcome, IndexError> {
        let mut last_err: Option<IndexError> = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let delay = Duration::from_secs(1 << (attempt - 2).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.reindex_once(change).await {
                Ok(chunks_indexed) => {
                    info!(
                        note_id = %change.note_id,
                        chunks = chunks_indexed,
                        attempt,
                        "re-index complete"
                    );
                    return Ok(ReindexOutcome {
                        chunks_indexed,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        note_id = %change.note_id,
                        attempt,
                        error = %e,
                        "re-index attempt failed; retrying"
                    );
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        // Unreachable in practice: the loop always returns on the last attempt.
        Err(last_err.unwrap_or(IndexError::Provider(anyhow::anyhow!(
            "re-index retries exhausted"
        ))))
    }

    /// One full pass of the pipeline. Every stage tolerates re-execution.
    async fn reindex_once(&self, change: &NoteChange) -> Result<usize, IndexError> {
        let removed = self
            .store
            .delete_note_chunks(&change.note_id)
            .await
            .map_err(IndexError::Store)?;
        debug!(note_id = %change.note_id, removed, "cleared previous generation");

        let drafts = chunker::chunk_note(
            &change.title,
            &change.content,
            change.course_tag.as_deref(),
            &self.options,
            &self.tokens,
        );
        if drafts.is_empty() {
            debug!(note_id = %change.note_id, "no indexable content");
            return Ok(0);
        }

        let texts: Vec<String> = drafts.iter().map(|d| d.content_embed.clone()).collect();
        let batch_cap = self
            .batch_size
            .min(self.embedder.max_batch_inputs())
            .max(1);

        let expected_dims = self.embedder.dims();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_cap) {
            let batch_vectors = self
                .embedder
                .embed_batch(batch)
                .await
                .map_err(IndexError::Provider)?;
            for vector in &batch_vectors {
                if vector.len() != expected_dims {
                    return Err(IndexError::DimensionMismatch {
                        expected: expected_dims,
                        actual: vector.len(),
                    });
                }
            }
            vectors.extend(batch_vectors);
        }
        if vectors.len() != texts.len() {
            return Err(IndexError::Provider(anyhow::anyhow!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        let created_at = chrono::Utc::now().timestamp();
        let model_name = self.embedder.model_name().to_string();
        let mut chunks = Vec::with_capacity(drafts.len());
        let mut embeddings = Vec::with_capacity(drafts.len());

        for (draft, vector) in drafts.into_iter().zip(vectors) {
            let chunk_id = Uuid::new_v4().to_string();
            embeddings.push(Embedding {
                id: Uuid::new_v4().to_string(),
                chunk_id: chunk_id.clone(),
                vector,
                model_name: model_name.clone(),
            });
            chunks.push(Chunk {
                id: chunk_id,
                owner_user_id: change.owner_user_id.clone(),
                note_id: change.note_id.clone(),
                note_title: change.title.clone(),
                section_path: draft.section_path,
                course_tag: change.course_tag.clone(),
                content_hash: hash_content(&draft.content_raw),
                content_raw: draft.content_raw,
                content_embed: draft.content_embed,
                chunk_index: draft.chunk_index,
                created_at,
            });
        }

        self.store
            .insert_generation(&chunks, &embeddings)
            .await
            .map_err(IndexError::Store)?;

        Ok(chunks.len())
    }
}

fn hash_content(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
