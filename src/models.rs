//! Core data models used throughout recall.
//!
//! These types represent the note-change events, chunks, embeddings, and
//! search results that flow through the indexing and retrieval pipeline.
//! Every field is explicitly typed; optionality is encoded in the type.

/// Inbound "note content changed" notification, delivered at-least-once by
/// the application's CRUD layer. Carries everything the re-index workflow
/// needs so it never has to read the note back.
#[derive(Debug, Clone)]
pub struct NoteChange {
    pub note_id: String,
    pub owner_user_id: String,
    pub title: String,
    pub content: String,
    pub course_tag: Option<String>,
}

/// Chunker output before ids and vectors are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDraft {
    /// Header titles from outermost to innermost enclosing section.
    pub section_path: Vec<String>,
    /// The exact retrievable text shown to callers.
    pub content_raw: String,
    /// `content_raw` prefixed with a contextual header; embedded, never displayed.
    pub content_embed: String,
    /// 0-based position within the note's generation.
    pub chunk_index: i64,
}

/// A persisted chunk: derived, disposable, replaced wholesale on every
/// re-index of its note.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub owner_user_id: String,
    pub note_id: String,
    /// Note title denormalized at chunk-creation time.
    pub note_title: String,
    pub section_path: Vec<String>,
    pub course_tag: Option<String>,
    pub content_raw: String,
    pub content_embed: String,
    pub chunk_index: i64,
    /// SHA-256 of `content_raw`, kept for staleness debugging.
    pub content_hash: String,
    /// Unix seconds at generation time; the `date_range` filter applies here.
    pub created_at: i64,
}

/// Embedding vector for a chunk. 1:1 child; destroyed with its chunk.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub id: String,
    pub chunk_id: String,
    /// Fixed-length vector; length must equal the model's declared dims.
    pub vector: Vec<f32>,
    pub model_name: String,
}

/// A chunk plus its ranking signal, produced only by query-time read paths.
///
/// `similarity` is `1 - cosine_distance` on the vector path, a BM25-derived
/// relevance on the lexical path, and the fused RRF score after hybrid
/// fusion. The scales are not comparable across paths; only ranks are.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: f64,
}

/// Optional narrowing applied to retrieval queries.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub course_tag: Option<String>,
    /// Inclusive Unix-second bounds on chunk creation time.
    pub date_range: Option<(i64, i64)>,
}
