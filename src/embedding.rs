//! Embedding capability.
//!
//! [`Embedder`] is all the vector index knows about embeddings. The one
//! concrete implementation, [`HttpEmbedder`], batches texts and posts them
//! to either provider the configuration names:
//!
//! | `embedding.provider` | Endpoint | Auth |
//! |----------------------|----------|------|
//! | `openai` | `POST https://api.openai.com/v1/embeddings` | `OPENAI_API_KEY` |
//! | `ollama` | `POST <url>/api/embed` | none |
//!
//! [`cosine_similarity`] is the measure the index ranks by.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::EmbeddingConfig;
use crate::http;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("{} returned no embedding for the query", embedder.model_name()))
}

enum Provider {
    OpenAI { api_key: String },
    Ollama { base_url: String },
}

impl Provider {
    fn label(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }
}

pub struct HttpEmbedder {
    provider: Provider,
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// # Errors
    ///
    /// Unknown provider, or `OPENAI_API_KEY` unset for `openai`.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "openai" => Provider::OpenAI {
                api_key: std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?,
            },
            "ollama" => Provider::Ollama {
                base_url: config
                    .url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            },
            other => bail!("Unknown embedding provider: {}", other),
        };

        Ok(Self {
            provider,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": batch });
        let (url, bearer) = match &self.provider {
            Provider::OpenAI { api_key } => (OPENAI_EMBEDDINGS_URL.to_string(), Some(api_key.as_str())),
            Provider::Ollama { base_url } => (format!("{}/api/embed", base_url), None),
        };

        let response = http::post_json_with_retry(
            &self.client,
            &url,
            bearer,
            &body,
            self.max_retries,
            self.provider.label(),
        )
        .await?;

        match self.provider {
            Provider::OpenAI { .. } => parse_openai_response(&response),
            Provider::Ollama { .. } => parse_ollama_response(&response),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        tracing::debug!(texts = texts.len(), model = %self.model, "embedded texts");
        Ok(vectors)
    }
}

fn to_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|items| items.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
}

/// `data[].embedding`, reordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(pos, item)| {
            let vector = item
                .get("embedding")
                .and_then(to_vector)
                .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
            let index = item
                .get("index")
                .and_then(Value::as_u64)
                .map_or(pos, |i| i as usize);
            Ok((index, vector))
        })
        .collect::<Result<Vec<_>>>()?;

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?
        .iter()
        .map(|e| to_vector(e).ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array")))
        .collect()
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(HttpEmbedder::new(config)?))
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Mismatched lengths, empty input, or a zero vector give `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
