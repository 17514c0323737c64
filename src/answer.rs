//! Answer assembler: turns retrieved chunks into a grounded LLM answer.
//!
//! This is a thin boundary around the external generation model. The
//! interesting parts are the grounding prompt (numbered excerpts labeled
//! with note title and section) and the insufficient-context check, a
//! substring heuristic over the generated text.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::RetrievedChunk;

/// Phrases that mark an answer as lacking grounding. The prompt instructs
/// the model to use the first one verbatim when the excerpts don't cover
/// the question.
const INSUFFICIENT_MARKERS: &[&str] = &[
    "don't have enough information",
    "do not have enough information",
    "insufficient context",
    "cannot answer this from your notes",
];

/// Generated answer plus the grounding verdict.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub insufficient_context: bool,
}

/// External text-generation capability: prompt in, text out.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the grounding prompt and run the generator.
///
/// With no retrieved chunks there is nothing to ground on, so the
/// insufficient-context answer is returned without a provider call.
pub async fn answer_query(
    generator: &dyn GenerationClient,
    query: &str,
    chunks: &[RetrievedChunk],
) -> Result<Answer> {
    if chunks.is_empty() {
        return Ok(Answer {
            text: format!("I {} in your notes to answer that.", INSUFFICIENT_MARKERS[0]),
            insufficient_context: true,
        });
    }

    let prompt = build_prompt(query, chunks);
    let text = generator.generate(&prompt).await?;
    let lower = text.to_lowercase();
    let insufficient_context = INSUFFICIENT_MARKERS.iter().any(|m| lower.contains(m));

    Ok(Answer {
        text,
        insufficient_context,
    })
}

fn build_prompt(query: &str, chunks: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(
        "You are a study assistant. Answer the question using only the \
         numbered excerpts from the user's own notes below. If the excerpts \
         do not contain the answer, reply exactly: \"I don't have enough \
         information in your notes to answer that.\"\n\n",
    );

    for (i, retrieved) in chunks.iter().enumerate() {
        let section = if retrieved.chunk.section_path.is_empty() {
            "Main".to_string()
        } else {
            retrieved.chunk.section_path.join(" > ")
        };
        prompt.push_str(&format!(
            "[{}] {} / {}\n{}\n\n",
            i + 1,
            retrieved.chunk.note_title,
            section,
            retrieved.chunk.content_raw
        ));
    }

    prompt.push_str(&format!("Question: {query}\n"));
    prompt
}

// ============ OpenAI ============

/// Generation provider backed by `POST /v1/chat/completions`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGeneration {
    model: String,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiGeneration {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model: config.model.clone(),
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiGeneration {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return json
                            .pointer("/choices/0/message/content")
                            .and_then(|c| c.as_str())
                            .map(|s| s.trim().to_string())
                            .ok_or_else(|| anyhow!("Invalid completion response"));
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Generation failed after retries")))
    }
}

/// Instantiate the configured generation provider.
pub fn create_client(config: &GenerationConfig) -> Result<std::sync::Arc<dyn GenerationClient>> {
    match config.provider.as_str() {
        "openai" => Ok(std::sync::Arc::new(OpenAiGeneration::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
