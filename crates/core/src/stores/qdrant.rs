use crate::error::StoreError;
use crate::models::{RetrievedChunk, SourceMetadata};
use crate::traits::{VectorDatabase, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

pub struct QdrantStore {
    endpoint: String,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }
}

async fn checked(response: Response, collection: &str) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT || body.contains("already exists") {
        return Err(StoreError::CollectionExists(collection.to_string()));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::CollectionNotFound(collection.to_string()));
    }
    Err(StoreError::Backend {
        backend: "qdrant".to_string(),
        details: format!("{status}: {body}"),
    })
}

/// Qdrant only accepts integer or UUID point ids.
pub fn point_id(chunk_id: &str) -> Uuid {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn payload(record: &VectorRecord) -> Value {
    json!({
        "chunk_id": record.id,
        "text": record.text,
        "source": record.metadata.source,
        "page": record.metadata.page,
        "uploadedAt": record.metadata.uploaded_at,
        "mimeType": record.metadata.mime_type,
    })
}

pub fn parse_search_hits(parsed: &Value) -> Vec<RetrievedChunk> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|hit| {
            let text_at = |pointer: &str| {
                hit.pointer(pointer)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            let score = hit.pointer("/score").and_then(Value::as_f64);

            RetrievedChunk {
                chunk_id: text_at("/payload/chunk_id").unwrap_or_default(),
                text: text_at("/payload/text").unwrap_or_default(),
                metadata: SourceMetadata {
                    source: text_at("/payload/source").unwrap_or_else(|| "unknown".to_string()),
                    page: hit
                        .pointer("/payload/page")
                        .and_then(Value::as_u64)
                        .and_then(|page| u32::try_from(page).ok()),
                    uploaded_at: text_at("/payload/uploadedAt"),
                    mime_type: text_at("/payload/mimeType"),
                },
                distance: score.map(|score| 1.0 - score),
            }
        })
        .collect()
}

#[async_trait]
impl VectorDatabase for QdrantStore {
    fn backend(&self) -> &'static str {
        "qdrant"
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .get(format!("{}/collections", self.endpoint))
            .send()
            .await?;
        let parsed: Value = checked(response, "").await?.json().await?;
        Ok(parsed
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|collection| collection.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, name))
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()
            .await?;
        checked(response, name).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(format!("{}/collections/{}", self.endpoint, name))
            .send()
            .await?;
        let parsed: Value = checked(response, name).await?.json().await?;
        // Deleting a missing collection succeeds with `"result": false`.
        if parsed.pointer("/result").and_then(Value::as_bool) == Some(false) {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn clear_collection(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, name
            ))
            .json(&json!({ "filter": {} }))
            .send()
            .await?;
        checked(response, name).await?;
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| {
                json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": record.vector,
                    "payload": payload(record),
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        checked(response, collection).await?;
        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, collection
            ))
            .json(&json!({
                "vector": vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;
        let parsed: Value = checked(response, collection).await?.json().await?;
        Ok(parse_search_hits(&parsed))
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/count",
                self.endpoint, collection
            ))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        let parsed: Value = checked(response, collection).await?.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| StoreError::Backend {
                backend: "qdrant".to_string(),
                details: format!("unexpected count response: {parsed}"),
            })
    }
}
