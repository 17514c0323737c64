//! Shared test doubles for the pipeline integration tests.

use anyhow::Result;
use async_trait::async_trait;

use recall::answer::GenerationClient;
use recall::embedding::EmbeddingClient;
use recall::models::NoteChange;

/// Word groups that define the topic axes of [`TopicEmbedder`] vectors.
const TOPIC_AXES: [&[&str]; 3] = [
    &["derivative", "integral", "limit", "calculus", "differentiable"],
    &["recipe", "dough", "flour", "bake", "cooking", "oven"],
    &["treaty", "empire", "revolution", "dynasty"],
];

/// Deterministic embedding client whose vectors cluster by topic: texts
/// about the same subject come out nearly parallel, unrelated texts nearly
/// orthogonal. Dimensionality is 4 (three topic axes plus a neutral axis).
pub struct TopicEmbedder;

impl TopicEmbedder {
    fn vectorize(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v = vec![0.0f32; 4];
        for (axis, words) in TOPIC_AXES.iter().enumerate() {
            v[axis] = words.iter().map(|w| lower.matches(w).count()).sum::<usize>() as f32;
        }
        if v.iter().all(|&x| x == 0.0) {
            v[3] = 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingClient for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topic-mock"
    }

    fn dims(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

/// Generation client that replies with a fixed string.
pub struct CannedGenerator(pub String);

#[async_trait]
impl GenerationClient for CannedGenerator {
    fn model_name(&self) -> &str {
        "canned-mock"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

pub fn note_change(
    note_id: &str,
    owner: &str,
    title: &str,
    content: &str,
    course: Option<&str>,
) -> NoteChange {
    NoteChange {
        note_id: note_id.to_string(),
        owner_user_id: owner.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        course_tag: course.map(|s| s.to_string()),
    }
}
