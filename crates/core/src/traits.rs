use crate::error::{LlmError, StoreError};
use crate::models::{Chunk, RetrievedChunk, SourceMetadata};
use async_trait::async_trait;

/// A chunk paired with its embedding, ready to be written to a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: SourceMetadata,
}

impl VectorRecord {
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.chunk_id.clone(),
            vector,
            text: chunk.text.clone(),
            metadata: chunk.metadata(),
        }
    }
}

/// Collection CRUD plus per-collection writes and nearest-neighbour reads.
///
/// Backends report the two lifecycle races as typed errors:
/// `StoreError::CollectionExists` from `create_collection` and
/// `StoreError::CollectionNotFound` from `delete_collection` and from any
/// per-collection call against a missing collection.
#[async_trait]
pub trait VectorDatabase: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError>;

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    /// Removes every record but keeps the collection itself.
    async fn clear_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<(), StoreError>;

    async fn nearest_neighbors(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Single-turn completion. No conversation state is kept between calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError>;
}
