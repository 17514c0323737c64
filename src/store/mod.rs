//! Storage abstraction for chunks and their embeddings.
//!
//! The [`ChunkStore`] trait defines every storage operation the indexing and
//! retrieval pipeline needs, enabling pluggable backends (SQLite for the
//! application, in-memory for tests).
//!
//! Isolation is structural: every read operation takes an `owner_user_id`
//! parameter and implementations must scope their queries to it. There is no
//! unscoped read path for chunk content.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, Embedding, SearchFilters};

/// A candidate chunk returned from vector or lexical search.
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub chunk: Chunk,
    /// Cosine distance for vector search (lower is better); BM25-derived
    /// relevance for lexical search (higher is better).
    pub raw_score: f64,
}

/// Abstract storage backend for the chunk index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`delete_note_chunks`](ChunkStore::delete_note_chunks) | Drop a note's current generation (embeddings cascade) |
/// | [`insert_generation`](ChunkStore::insert_generation) | Persist one generation atomically |
/// | [`vector_search`](ChunkStore::vector_search) | Nearest chunks by cosine distance, owner-scoped |
/// | [`lexical_search`](ChunkStore::lexical_search) | Ranked full-text matches, owner-scoped |
/// | [`note_chunks`](ChunkStore::note_chunks) | A note's current chunks in index order |
/// | [`count_owner_chunks`](ChunkStore::count_owner_chunks) | Indexed chunk count for an owner |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Delete every chunk belonging to a note, cascading to embeddings.
    /// Idempotent: deleting an already-empty set is a no-op. Returns the
    /// number of chunks removed.
    async fn delete_note_chunks(&self, note_id: &str) -> Result<u64>;

    /// Persist one full generation: all chunks, then all embeddings, as a
    /// single logical unit. `embeddings` pairs 1:1 with `chunks` by
    /// `chunk_id`; readers never observe a chunk without its embedding.
    async fn insert_generation(&self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()>;

    /// The `limit` nearest chunks to `query_vec` for this owner, ordered by
    /// ascending cosine distance (carried in `raw_score`).
    async fn vector_search(
        &self,
        owner_user_id: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<ChunkMatch>>;

    /// Ranked lexical matches over note title + chunk body for this owner,
    /// best first (relevance in `raw_score`).
    async fn lexical_search(
        &self,
        owner_user_id: &str,
        query: &str,
        course_tag: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChunkMatch>>;

    /// All chunks currently stored for a note, ordered by `chunk_index`.
    async fn note_chunks(&self, note_id: &str) -> Result<Vec<Chunk>>;

    /// Number of chunks currently indexed for an owner.
    async fn count_owner_chunks(&self, owner_user_id: &str) -> Result<i64>;
}
