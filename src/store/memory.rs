//! In-memory [`ChunkStore`] implementation for tests.
//!
//! Uses `Vec` and `HashMap` behind `std::sync::RwLock`. Vector search is
//! brute-force cosine distance over all stored vectors; lexical search is a
//! term-match count over note title + chunk body.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_distance;
use crate::models::{Chunk, Embedding, SearchFilters};

use super::{ChunkMatch, ChunkStore};

/// In-memory store for tests and examples.
#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<Vec<Chunk>>,
    embeddings: RwLock<HashMap<String, Embedding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn filters_allow(chunk: &Chunk, filters: &SearchFilters) -> bool {
    if let Some(ref tag) = filters.course_tag {
        if chunk.course_tag.as_deref() != Some(tag.as_str()) {
            return false;
        }
    }
    if let Some((from, until)) = filters.date_range {
        if chunk.created_at < from || chunk.created_at > until {
            return false;
        }
    }
    true
}

#[async_trait]
impl ChunkStore for MemoryStore {
    async fn delete_note_chunks(&self, note_id: &str) -> Result<u64> {
        let removed_ids: Vec<String> = {
            let mut chunks = self.chunks.write().unwrap();
            let ids: Vec<String> = chunks
                .iter()
                .filter(|c| c.note_id == note_id)
                .map(|c| c.id.clone())
                .collect();
            chunks.retain(|c| c.note_id != note_id);
            ids
        };

        let mut embeddings = self.embeddings.write().unwrap();
        for id in &removed_ids {
            embeddings.remove(id);
        }
        Ok(removed_ids.len() as u64)
    }

    async fn insert_generation(&self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "generation mismatch: {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }
        let mut stored_chunks = self.chunks.write().unwrap();
        let mut stored_embeddings = self.embeddings.write().unwrap();
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            if embedding.chunk_id != chunk.id {
                bail!("embedding {} does not belong to chunk {}", embedding.id, chunk.id);
            }
            stored_chunks.push(chunk.clone());
            stored_embeddings.insert(chunk.id.clone(), embedding.clone());
        }
        Ok(())
    }

    async fn vector_search(
        &self,
        owner_user_id: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<ChunkMatch>> {
        let chunks = self.chunks.read().unwrap();
        let embeddings = self.embeddings.read().unwrap();

        let mut matches: Vec<ChunkMatch> = chunks
            .iter()
            .filter(|c| c.owner_user_id == owner_user_id && filters_allow(c, filters))
            .filter_map(|c| {
                embeddings.get(&c.id).map(|e| ChunkMatch {
                    chunk: c.clone(),
                    raw_score: cosine_distance(query_vec, &e.vector) as f64,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.raw_score
                .partial_cmp(&b.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }

    async fn lexical_search(
        &self,
        owner_user_id: &str,
        query: &str,
        course_tag: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ChunkMatch>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self.chunks.read().unwrap();
        let mut matches: Vec<ChunkMatch> = chunks
            .iter()
            .filter(|c| c.owner_user_id == owner_user_id)
            .filter(|c| course_tag.is_none() || c.course_tag.as_deref() == course_tag)
            .filter_map(|c| {
                let haystack =
                    format!("{} {}", c.note_title, c.content_raw).to_lowercase();
                let hits = terms.iter().filter(|t| haystack.contains(*t)).count();
                if hits > 0 {
                    Some(ChunkMatch {
                        chunk: c.clone(),
                        raw_score: hits as f64,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }

    async fn note_chunks(&self, note_id: &str) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        let mut out: Vec<Chunk> = chunks
            .iter()
            .filter(|c| c.note_id == note_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn count_owner_chunks(&self, owner_user_id: &str) -> Result<i64> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .iter()
            .filter(|c| c.owner_user_id == owner_user_id)
            .count() as i64)
    }
}
