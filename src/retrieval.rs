//! Query-time read paths: vector retrieval, lexical search, and hybrid
//! fusion.
//!
//! The vector and lexical paths are independent ranking signals over the
//! same chunk store. Hybrid search runs both concurrently and merges them
//! with Reciprocal Rank Fusion, which needs no score normalization between
//! the heterogeneous signals; only ranks matter.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::embedding::EmbeddingClient;
use crate::models::{RetrievedChunk, SearchFilters};
use crate::store::ChunkStore;

/// RRF damping constant; de-weights rank-1 dominance.
const RRF_K: f64 = 60.0;

/// Each fusion input list is asked for this multiple of the final limit.
const CANDIDATE_MULTIPLIER: i64 = 2;

/// Outcome of a vector retrieval, including the query embedding and wall
/// time for observability.
#[derive(Debug)]
pub struct Retrieval {
    pub results: Vec<RetrievedChunk>,
    pub query_vec: Vec<f32>,
    pub latency: Duration,
}

/// Embed the query once and return the owner's nearest chunks.
///
/// `similarity` is `1 - cosine_distance`: a monotonic re-scaling, not a
/// bounded probability. An owner with nothing indexed gets an empty list,
/// never an error.
pub async fn retrieve<S: ChunkStore>(
    store: &S,
    embedder: &dyn EmbeddingClient,
    owner_user_id: &str,
    query: &str,
    filters: &SearchFilters,
    limit: i64,
) -> Result<Retrieval> {
    let start = Instant::now();

    if query.trim().is_empty() {
        return Ok(Retrieval {
            results: Vec::new(),
            query_vec: Vec::new(),
            latency: start.elapsed(),
        });
    }

    let query_vec = embedder.embed(query).await?;
    let matches = store
        .vector_search(owner_user_id, &query_vec, filters, limit)
        .await?;

    let results = matches
        .into_iter()
        .map(|m| RetrievedChunk {
            chunk: m.chunk,
            similarity: 1.0 - m.raw_score,
        })
        .collect();

    Ok(Retrieval {
        results,
        query_vec,
        latency: start.elapsed(),
    })
}

/// Ranked lexical matches over note title + chunk body for this owner.
///
/// The lexical relevance lands in `similarity` but is not comparable in
/// scale to vector similarity; downstream fusion uses ranks only.
pub async fn lexical_search<S: ChunkStore>(
    store: &S,
    owner_user_id: &str,
    query: &str,
    limit: i64,
    course_tag: Option<&str>,
) -> Result<Vec<RetrievedChunk>> {
    let matches = store
        .lexical_search(owner_user_id, query, course_tag, limit)
        .await?;
    Ok(matches
        .into_iter()
        .map(|m| RetrievedChunk {
            chunk: m.chunk,
            similarity: m.raw_score,
        })
        .collect())
}

/// Run vector and lexical search concurrently and fuse their rankings.
///
/// Each path is asked for `limit * 2` candidates to give the fusion enough
/// material; the fused `similarity` is the RRF score, an opaque ranking
/// signal.
pub async fn hybrid_search<S: ChunkStore>(
    store: &S,
    embedder: &dyn EmbeddingClient,
    owner_user_id: &str,
    query: &str,
    limit: i64,
    filters: &SearchFilters,
) -> Result<Vec<RetrievedChunk>> {
    let candidate_k = limit.saturating_mul(CANDIDATE_MULTIPLIER);

    let (vector, lexical) = tokio::join!(
        retrieve(store, embedder, owner_user_id, query, filters, candidate_k),
        lexical_search(
            store,
            owner_user_id,
            query,
            candidate_k,
            filters.course_tag.as_deref()
        ),
    );

    Ok(fuse(vector?.results, lexical?, limit))
}

/// Reciprocal Rank Fusion over two ranked lists.
///
/// A chunk is identified by `(note_id, chunk_index)`, since the same logical
/// unit may arrive from both paths, and scores `1 / (k + rank)` per list it
/// appears in, summed.
fn fuse(
    vector_ranked: Vec<RetrievedChunk>,
    lexical_ranked: Vec<RetrievedChunk>,
    limit: i64,
) -> Vec<RetrievedChunk> {
    let mut fused: HashMap<(String, i64), (RetrievedChunk, f64)> = HashMap::new();

    for ranked in [vector_ranked, lexical_ranked] {
        for (rank, result) in ranked.into_iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (rank + 1) as f64);
            let key = (result.chunk.note_id.clone(), result.chunk.chunk_index);
            fused
                .entry(key)
                .and_modify(|(_, score)| *score += contribution)
                .or_insert((result, contribution));
        }
    }

    let mut out: Vec<RetrievedChunk> = fused
        .into_values()
        .map(|(mut result, score)| {
            result.similarity = score;
            result
        })
        .collect();

    // Deterministic order: fused score desc, then identity for ties.
    out.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.note_id.cmp(&b.chunk.note_id))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    out.truncate(limit.max(0) as usize);
    out
}
