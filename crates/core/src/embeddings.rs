use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;
pub const COHERE_EMBED_URL: &str = "https://api.cohere.ai/v1/embed";
pub const COHERE_DEFAULT_MODEL: &str = "embed-english-v3.0";
pub const COHERE_DEFAULT_DIMENSIONS: usize = 1024;
const COHERE_MAX_BATCH: usize = 96;

/// Output size of a Cohere embedding model. Unknown names get the v3 size.
pub fn cohere_dimensions_for_model(model: &str) -> usize {
    match model.trim() {
        "embed-english-light-v3.0" | "embed-multilingual-light-v3.0" => 384,
        "embed-english-v2.0" => 4096,
        "embed-multilingual-v2.0" => 768,
        _ => COHERE_DEFAULT_DIMENSIONS,
    }
}

/// One vector per input text, returned in input order.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let vectors = self.embed_documents(&[text.to_string()]).await?;
        let actual = vectors.len();
        match <[Vec<f32>; 1]>::try_from(vectors) {
            Ok([vector]) => Ok(vector),
            Err(_) => Err(StoreError::EmbeddingMismatch {
                expected: 1,
                actual,
            }),
        }
    }
}

/// Offline hashing embedder over character trigrams. Useful for local runs
/// and tests where no embedding API is reachable.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingService for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct CohereEmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'a str,
    truncate: &'a str,
}

#[derive(Debug, Deserialize)]
struct CohereEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct CohereEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl CohereEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            dimensions: cohere_dimensions_for_model(&model),
            model,
        }
    }

    /// Overrides the size derived from the model name.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn embed_batch(&self, texts: &[String], input_type: &str) -> Result<Vec<Vec<f32>>, StoreError> {
        if self.api_key.trim().is_empty() {
            return Err(StoreError::NotConfigured("COHERE_API_KEY is empty".to_string()));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(COHERE_MAX_BATCH) {
            debug!(batch = batch.len(), model = %self.model, "cohere embed request");
            let response = self
                .client
                .post(COHERE_EMBED_URL)
                .bearer_auth(&self.api_key)
                .json(&CohereEmbedRequest {
                    texts: batch,
                    model: &self.model,
                    input_type,
                    truncate: "END",
                })
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Backend {
                    backend: "cohere".to_string(),
                    details: format!("{status}: {body}"),
                });
            }

            let parsed: CohereEmbedResponse = response.json().await?;
            if parsed.embeddings.len() != batch.len() {
                return Err(StoreError::EmbeddingMismatch {
                    expected: batch.len(),
                    actual: parsed.embeddings.len(),
                });
            }
            vectors.extend(parsed.embeddings);
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingService for CohereEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed_batch(texts, "search_document").await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut vectors = self.embed_batch(&[text.to_string()], "search_query").await?;
        vectors
            .pop()
            .ok_or(StoreError::EmbeddingMismatch { expected: 1, actual: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        cohere_dimensions_for_model, CharacterNgramEmbedder, CohereEmbedder, EmbeddingService,
        COHERE_DEFAULT_DIMENSIONS,
    };
    use crate::error::StoreError;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow");
        let second = embedder.embed("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn batch_embedding_preserves_order_and_count() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let vectors = embedder.embed_documents(&texts).await.expect("local embedding");
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], embedder.embed("second text"));

        let query = embedder.embed_query("first text").await.expect("local embedding");
        assert_eq!(query, vectors[0]);
    }

    #[tokio::test]
    async fn cohere_without_key_is_not_configured() {
        let embedder = CohereEmbedder::new("", "embed-english-v3.0");
        let result = embedder.embed_query("anything").await;
        assert!(matches!(result, Err(StoreError::NotConfigured(_))));
    }

    #[test]
    fn cohere_dimensions_follow_the_model() {
        assert_eq!(cohere_dimensions_for_model("embed-english-v3.0"), 1024);
        assert_eq!(cohere_dimensions_for_model("embed-english-light-v3.0"), 384);
        assert_eq!(cohere_dimensions_for_model("embed-multilingual-light-v3.0"), 384);
        assert_eq!(cohere_dimensions_for_model("embed-multilingual-v2.0"), 768);
        assert_eq!(cohere_dimensions_for_model("embed-english-v2.0"), 4096);
        assert_eq!(
            cohere_dimensions_for_model("some-future-model"),
            COHERE_DEFAULT_DIMENSIONS
        );

        let light = CohereEmbedder::new("key", "embed-english-light-v3.0");
        assert_eq!(light.dimensions(), 384);
        assert_eq!(light.with_dimensions(512).dimensions(), 512);
    }
}
