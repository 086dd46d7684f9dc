//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete backends:
//! - **[`DisabledEmbedder`]** — returns errors; used when embeddings are not configured.
//! - **[`GeminiEmbedder`]** — Google Generative Language `batchEmbedContents` API.
//! - **[`OpenAiEmbedder`]** — OpenAI `/v1/embeddings` API.
//!
//! Also provides the vector utilities the index is built on:
//! [`vec_to_blob`] / [`blob_to_vec`] for SQLite BLOB storage and
//! [`cosine_similarity`] for scoring.
//!
//! # Retry Strategy
//!
//! Both remote backends retry transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// An embedding backend: turns text into fixed-dimension vectors.
///
/// Repeated embedding of the same text must be stable enough that
/// similarity search over the resulting vectors behaves consistently.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"embedding-001"`).
    fn model_name(&self) -> &str;
    /// Vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let vectors = embedder.embed(&[text.to_string()]).await?;
    vectors
        .into_iter()
        .next()
        .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
}

/// Create the configured [`Embedder`].
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "gemini" => Ok(Arc::new(GeminiEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(Error::Embedding(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Resolve the Gemini API key from the environment.
///
/// `GEMINI_API_KEY` wins; `GOOGLE_API_KEY` is accepted for compatibility
/// with Google SDK conventions.
pub(crate) fn gemini_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .ok()
}

/// POST a JSON request with retry/backoff, returning the parsed body.
///
/// Shared by the embedding and generation backends; the error is a plain
/// message the caller wraps into its own error kind.
pub(crate) async fn post_json_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: u32,
) -> std::result::Result<serde_json::Value, String> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let req = match request.try_clone() {
            Some(r) => r,
            None => return Err("request body is not cloneable".to_string()),
        };

        match req.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| format!("invalid JSON response: {}", e));
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body = response.text().await.unwrap_or_default();
                    last_err = Some(format!("HTTP {}: {}", status, body));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body = response.text().await.unwrap_or_default();
                return Err(format!("HTTP {}: {}", status, body));
            }
            Err(e) => {
                last_err = Some(e.to_string());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| "request failed after retries".to_string()))
}

// ============ Disabled ============

/// A no-op embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Embedding(
            "embedding provider is disabled".to_string(),
        ))
    }
}

// ============ Gemini ============

/// Embedding backend for the Google Generative Language API.
///
/// Calls `POST /v1beta/models/{model}:batchEmbedContents`. Requires
/// `GEMINI_API_KEY` (or `GOOGLE_API_KEY`) in the environment.
pub struct GeminiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::Embedding("embedding.model required for Gemini provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            Error::Embedding("embedding.dims required for Gemini provider".to_string())
        })?;
        let api_key = gemini_api_key().ok_or_else(|| {
            Error::Embedding("GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_path = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": model_path,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents",
            self.model
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({ "requests": requests }));

        let json = post_json_with_retry(request, self.max_retries)
            .await
            .map_err(Error::Embedding)?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Embedding("missing embeddings array in response".to_string()))?;

        let mut out = Vec::with_capacity(embeddings.len());
        for item in embeddings {
            let values = item
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| Error::Embedding("missing values in embedding".to_string()))?;
            let vec: Vec<f32> = values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            check_dims(self.dims, vec.len())?;
            out.push(vec);
        }

        if out.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                out.len()
            )));
        }

        Ok(out)
    }
}

// ============ OpenAI ============

/// Embedding backend for the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            Error::Embedding("embedding.model required for OpenAI provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            Error::Embedding("embedding.dims required for OpenAI provider".to_string())
        })?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Embedding("OPENAI_API_KEY not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Embedding(e.to_string()))?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts,
            }));

        let json = post_json_with_retry(request, self.max_retries)
            .await
            .map_err(Error::Embedding)?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| Error::Embedding("missing data array in response".to_string()))?;

        let mut out = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| Error::Embedding("missing embedding in response".to_string()))?;
            let vec: Vec<f32> = embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            check_dims(self.dims, vec.len())?;
            out.push(vec);
        }

        if out.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                out.len()
            )));
        }

        Ok(out)
    }
}

fn check_dims(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::Embedding(format!(
            "embedding dimensionality mismatch: expected {}, got {}",
            expected, got
        )));
    }
    Ok(())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Trailing partial values are
/// discarded.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors, in `[-1.0, 1.0]`.
///
/// Higher means more similar. Returns `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![0.25f32, -1.5, 42.0, -0.0625];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
        assert!(blob_to_vec(&[]).is_empty());
    }

    #[test]
    fn cosine_direction() {
        let v = vec![0.5, 1.0, -2.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);

        let neg = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn disabled_embedder_rejects() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let err = rt
            .block_on(DisabledEmbedder.embed(&["x".to_string()]))
            .unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }
}
