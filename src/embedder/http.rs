/// HTTP embedder calling an external embedding service.
///
/// Speaks a minimal JSON contract: POST `{ "model": ..., "input": [...] }`,
/// expect `{ "embeddings": [[f32, ...], ...] }`. Input texts are truncated to
/// a configured size before sending; the service sees bounded payloads only.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, EmbedderError};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedder backed by an HTTP embedding endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
    max_input_chars: usize,
}

impl HttpEmbedder {
    /// Create a new `HttpEmbedder` against the given endpoint.
    pub fn new(
        endpoint: &str,
        model: &str,
        dimensions: usize,
        max_input_chars: usize,
        timeout_secs: u64,
    ) -> Result<Self, EmbedderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EmbedderError::RequestFailed(format!("client init: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            dimensions,
            max_input_chars,
        })
    }

    /// Truncate text to the configured maximum, respecting char boundaries.
    fn bound_input<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.max_input_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedderError::InvalidResponse("empty embeddings array".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input: Vec<&str> = texts.iter().map(|t| self.bound_input(t)).collect();
        debug!("embedding {} texts via {}", input.len(), self.endpoint);

        let request = EmbedRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbedderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EmbedderError::RequestFailed(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbedderError::CountMismatch {
                sent: texts.len(),
                received: body.embeddings.len(),
            });
        }

        for vector in &body.embeddings {
            if vector.len() != self.dimensions {
                return Err(EmbedderError::InvalidResponse(format!(
                    "expected {}-dimension vectors, got {}",
                    self.dimensions,
                    vector.len()
                )));
            }
        }

        Ok(body.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_input_short_text() {
        let embedder = HttpEmbedder::new("http://localhost:9000/embed", "m", 384, 10, 5).unwrap();
        assert_eq!(embedder.bound_input("short"), "short");
    }

    #[test]
    fn test_bound_input_truncates() {
        let embedder = HttpEmbedder::new("http://localhost:9000/embed", "m", 384, 4, 5).unwrap();
        assert_eq!(embedder.bound_input("longer text"), "long");
    }

    #[test]
    fn test_bound_input_multibyte_boundary() {
        let embedder = HttpEmbedder::new("http://localhost:9000/embed", "m", 384, 2, 5).unwrap();
        // Must cut between chars, not bytes
        assert_eq!(embedder.bound_input("héllo"), "hé");
    }

    #[tokio::test]
    async fn test_embed_batch_empty_is_noop() {
        let embedder = HttpEmbedder::new("http://localhost:9000/embed", "m", 384, 100, 5).unwrap();
        let out = embedder.embed_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_embed_unreachable_endpoint_fails() {
        // Port 1 is never an embedding service; the call must fail cleanly.
        let embedder = HttpEmbedder::new("http://127.0.0.1:1/embed", "m", 384, 100, 1).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbedderError::RequestFailed(_)));
    }
}
