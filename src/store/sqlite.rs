//! SQLite-backed [`ChunkStore`] implementation.
//!
//! Chunks live in a plain table, their text is mirrored into an FTS5 virtual
//! table for BM25 ranking, and embedding vectors are stored as little-endian
//! `f32` BLOBs with cosine distance computed in Rust.
//!
//! Generation replacement is transactional: the delete path removes
//! embeddings, FTS rows, and chunks together, and the insert path writes all
//! chunks then all embeddings before committing, so a reader never observes a
//! chunk without its embedding.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::models::{Chunk, Embedding, SearchFilters};

use super::{ChunkMatch, ChunkStore};

/// SQLite implementation of the [`ChunkStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const CHUNK_COLUMNS: &str = "c.id, c.owner_user_id, c.note_id, c.note_title, c.section_path, \
     c.course_tag, c.content_raw, c.content_embed, c.chunk_index, c.content_hash, c.created_at";

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let section_path_json: String = row.get("section_path");
    let section_path: Vec<String> =
        serde_json::from_str(&section_path_json).unwrap_or_default();
    Chunk {
        id: row.get("id"),
        owner_user_id: row.get("owner_user_id"),
        note_id: row.get("note_id"),
        note_title: row.get("note_title"),
        section_path,
        course_tag: row.get("course_tag"),
        content_raw: row.get("content_raw"),
        content_embed: row.get("content_embed"),
        chunk_index: row.get("chunk_index"),
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
    }
}

/// Quote each query term for FTS5 and join with OR, so natural-language
/// queries rank on any matching term instead of requiring all of them.
fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn delete_note_chunks(&self, note_id: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM embeddings WHERE chunk_id IN (SELECT id FROM chunks WHERE note_id = ?)",
        )
        .bind(note_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks_fts WHERE note_id = ?")
            .bind(note_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM chunks WHERE note_id = ?")
            .bind(note_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn insert_generation(&self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            bail!(
                "generation mismatch: {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let mut tx = self.pool.begin().await?;
        let now = chrono::Utc::now().timestamp();

        for chunk in chunks {
            let section_path = serde_json::to_string(&chunk.section_path)?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, owner_user_id, note_id, note_title, section_path,
                                    course_tag, content_raw, content_embed, chunk_index,
                                    content_hash, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.owner_user_id)
            .bind(&chunk.note_id)
            .bind(&chunk.note_title)
            .bind(&section_path)
            .bind(&chunk.course_tag)
            .bind(&chunk.content_raw)
            .bind(&chunk.content_embed)
            .bind(chunk.chunk_index)
            .bind(&chunk.content_hash)
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO chunks_fts (chunk_id, note_id, owner_user_id, course_tag, title, body) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.note_id)
            .bind(&chunk.owner_user_id)
            .bind(&chunk.course_tag)
            .bind(&chunk.note_title)
            .bind(&chunk.content_raw)
            .execute(&mut *tx)
            .await?;
        }

        for embedding in embeddings {
            sqlx::query(
                "INSERT INTO embeddings (id, chunk_id, model, dims, vector, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&embedding.id)
            .bind(&embedding.chunk_id)
            .bind(&embedding.model_name)
            .bind(embedding.vector.len() as i64)
            .bind(vec_to_blob(&embedding.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn vector_search(
        &self,
        owner_user_id: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<ChunkMatch>> {
        let mut sql = format!(
            "SELECT e.vector, {CHUNK_COLUMNS} \
             FROM embeddings e JOIN chunks c ON c.id = e.chunk_id \
             WHERE c.owner_user_id = ?"
        );
        if filters.course_tag.is_some() {
            sql.push_str(" AND c.course_tag = ?");
        }
        if filters.date_range.is_some() {
            sql.push_str(" AND c.created_at BETWEEN ? AND ?");
        }

        let mut query = sqlx::query(&sql).bind(owner_user_id);
        if let Some(ref tag) = filters.course_tag {
            query = query.bind(tag);
        }
        if let Some((from, until)) = filters.date_range {
            query = query.bind(from).bind(until);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut matches: Vec<ChunkMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                let vector = blob_to_vec(&blob);
                ChunkMatch {
                    chunk: chunk_from_row(row),
                    raw_score: cosine_distance(query_vec, &vector) as f64,
                }
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
        let match_expr = fts_match_expr(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT rank, {CHUNK_COLUMNS} \
             FROM chunks_fts JOIN chunks c ON c.id = chunks_fts.chunk_id \
             WHERE chunks_fts MATCH ? AND chunks_fts.owner_user_id = ?"
        );
        if course_tag.is_some() {
            sql.push_str(" AND chunks_fts.course_tag = ?");
        }
        sql.push_str(" ORDER BY rank LIMIT ?");

        let mut fts_query = sqlx::query(&sql).bind(&match_expr).bind(owner_user_id);
        if let Some(tag) = course_tag {
            fts_query = fts_query.bind(tag);
        }
        let rows = fts_query.bind(limit).fetch_all(&self.pool).await?;

        let matches = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                ChunkMatch {
                    chunk: chunk_from_row(row),
                    // FTS5 rank is more negative for better matches.
                    raw_score: -rank,
                }
            })
            .collect();

        Ok(matches)
    }

    async fn note_chunks(&self, note_id: &str) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks c WHERE c.note_id = ? ORDER BY c.chunk_index ASC"
        );
        let rows = sqlx::query(&sql).bind(note_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn count_owner_chunks(&self, owner_user_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE owner_user_id = ?")
                .bind(owner_user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
