//! Text embedding abstraction.
//!
//! The ingestion pipeline and the semantic-search tool both go through
//! `Embedder`; the production backend calls the Gemini embedding API.

use async_trait::async_trait;
use rq_core::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "text-embedding-004";
const DEFAULT_DIMENSION: u64 = 768;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| rq_core::Error::UpstreamUnavailable("empty embedding response".into()))
    }

    /// Output vector dimension.
    fn dimension(&self) -> u64;
}

#[derive(Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Serialize)]
struct EmbedContentRequest {
    model: String,
    content: EmbedContent,
}

#[derive(Serialize)]
struct BatchEmbedContentsRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedContentsResponse {
    embeddings: Vec<ContentEmbedding>,
}

/// Gemini embedding backend (`batchEmbedContents`).
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: u64,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, dimension: u64) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{API_BASE}/models/{}:batchEmbedContents", self.model);
        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.model),
                    content: EmbedContent {
                        parts: vec![EmbedPart { text: text.clone() }],
                    },
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?
            .error_for_status()
            .map_err(classify_reqwest_error)?;

        let parsed: BatchEmbedContentsResponse = response
            .json()
            .await
            .map_err(|e| rq_core::Error::UpstreamUnavailable(format!("embedding decode: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(rq_core::Error::UpstreamUnavailable(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> rq_core::Error {
    if err.is_timeout() {
        rq_core::Error::UpstreamTimeout(format!("embedding request: {err}"))
    } else {
        rq_core::Error::UpstreamUnavailable(format!("embedding request: {err}"))
    }
}
