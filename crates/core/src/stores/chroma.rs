use crate::error::StoreError;
use crate::models::{RetrievedChunk, SourceMetadata};
use crate::traits::{VectorDatabase, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";
const CLEAR_PAGE_SIZE: usize = 1000;

pub struct ChromaStore {
    endpoint: Url,
    client: Client,
}

impl ChromaStore {
    pub fn new(endpoint: &str) -> Result<Self, StoreError> {
        Self::with_client(endpoint, Client::new())
    }

    pub fn with_client(endpoint: &str, client: Client) -> Result<Self, StoreError> {
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        Ok(Self { endpoint, client })
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self.endpoint.join(&format!("api/v1/{path}"))?)
    }

    async fn collection_id(&self, name: &str) -> Result<Uuid, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("collections/{name}"))?)
            .send()
            .await?;
        let body: Value = checked(response, name).await?.json().await?;
        parse_collection_id(&body)
    }
}

async fn checked(response: Response, collection: &str) -> Result<Response, StoreError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status, &body, collection))
}

/// Chroma reports lifecycle races only through the message text, and older
/// servers answer them with a 500.
pub fn classify_error(status: StatusCode, body: &str, collection: &str) -> StoreError {
    let lowered = body.to_lowercase();
    if lowered.contains("already exists") || status == StatusCode::CONFLICT {
        StoreError::CollectionExists(collection.to_string())
    } else if lowered.contains("does not exist") || status == StatusCode::NOT_FOUND {
        StoreError::CollectionNotFound(collection.to_string())
    } else {
        StoreError::Backend {
            backend: "chroma".to_string(),
            details: format!("{status}: {body}"),
        }
    }
}

fn parse_collection_id(body: &Value) -> Result<Uuid, StoreError> {
    let raw = body
        .pointer("/id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Backend {
            backend: "chroma".to_string(),
            details: "collection response has no id".to_string(),
        })?;
    Uuid::parse_str(raw).map_err(|error| StoreError::Backend {
        backend: "chroma".to_string(),
        details: format!("collection id {raw} is not a uuid: {error}"),
    })
}

fn parse_ids(body: &Value) -> Vec<String> {
    body.get("ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn metadata_to_json(metadata: &SourceMetadata) -> Value {
    let mut map = Map::new();
    map.insert("source".to_string(), json!(metadata.source));
    if let Some(page) = metadata.page {
        map.insert("page".to_string(), json!(page));
    }
    if let Some(uploaded_at) = &metadata.uploaded_at {
        map.insert("uploadedAt".to_string(), json!(uploaded_at));
    }
    if let Some(mime_type) = &metadata.mime_type {
        map.insert("mimeType".to_string(), json!(mime_type));
    }
    Value::Object(map)
}

fn metadata_from_json(value: Option<&Value>) -> SourceMetadata {
    let field = |name: &str| value.and_then(|value| value.get(name));
    SourceMetadata {
        source: field("source")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        page: field("page")
            .and_then(Value::as_u64)
            .and_then(|page| u32::try_from(page).ok()),
        uploaded_at: field("uploadedAt").and_then(Value::as_str).map(str::to_string),
        mime_type: field("mimeType").and_then(Value::as_str).map(str::to_string),
    }
}

/// Query responses hold one row per query embedding; only the first is used.
pub fn parse_query_response(body: &Value) -> Vec<RetrievedChunk> {
    let row = |field: &str| {
        body.pointer(&format!("/{field}/0"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };
    let ids = row("ids");
    let documents = row("documents");
    let metadatas = row("metadatas");
    let distances = row("distances");

    ids.iter()
        .enumerate()
        .map(|(index, id)| RetrievedChunk {
            chunk_id: id.as_str().unwrap_or_default().to_string(),
            text: documents
                .get(index)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            metadata: metadata_from_json(metadatas.get(index)),
            distance: distances.get(index).and_then(Value::as_f64),
        })
        .collect()
}

#[async_trait]
impl VectorDatabase for ChromaStore {
    fn backend(&self) -> &'static str {
        "chroma"
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self.client.get(self.url("collections")?).send().await?;
        let body: Value = checked(response, "").await?.json().await?;
        Ok(body
            .as_array()
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|collection| collection.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_collection(&self, name: &str, _dimensions: usize) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.url("collections")?)
            .json(&json!({ "name": name, "get_or_create": false }))
            .send()
            .await?;
        checked(response, name).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(&format!("collections/{name}"))?)
            .send()
            .await?;
        checked(response, name).await?;
        Ok(())
    }

    /// Deletes by explicit id, a page at a time, until the collection is empty.
    async fn clear_collection(&self, name: &str) -> Result<(), StoreError> {
        let id = self.collection_id(name).await?;
        loop {
            let response = self
                .client
                .post(self.url(&format!("collections/{id}/get"))?)
                .json(&json!({ "limit": CLEAR_PAGE_SIZE, "include": [] }))
                .send()
                .await?;
            let body: Value = checked(response, name).await?.json().await?;
            let ids = parse_ids(&body);
            if ids.is_empty() {
                return Ok(());
            }

            debug!(collection = name, ids = ids.len(), "chroma delete");
            let response = self
                .client
                .post(self.url(&format!("collections/{id}/delete"))?)
                .json(&json!({ "ids": ids }))
                .send()
                .await?;
            checked(response, name).await?;
        }
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let id = self.collection_id(collection).await?;
        debug!(collection, records = records.len(), "chroma upsert");
        let response = self
            .client
            .post(self.url(&format!("collections/{id}/upsert"))?)
            .json(&json!({
                "ids": records.iter().map(|record| record.id.as_str()).collect::<Vec<_>>(),
                "embeddings": records.iter().map(|record| &record.vector).collect::<Vec<_>>(),
                "documents": records.iter().map(|record| record.text.as_str()).collect::<Vec<_>>(),
                "metadatas": records
                    .iter()
                    .map(|record| metadata_to_json(&record.metadata))
                    .collect::<Vec<_>>(),
            }))
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
        let id = self.collection_id(collection).await?;
        let response = self
            .client
            .post(self.url(&format!("collections/{id}/query"))?)
            .json(&json!({
                "query_embeddings": [vector],
                "n_results": k,
                "include": ["documents", "metadatas", "distances"],
            }))
            .send()
            .await?;
        let body: Value = checked(response, collection).await?.json().await?;
        Ok(parse_query_response(&body))
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let id = self.collection_id(collection).await?;
        let response = self
            .client
            .get(self.url(&format!("collections/{id}/count"))?)
            .send()
            .await?;
        let body: Value = checked(response, collection).await?.json().await?;
        body.as_u64()
            .map(|count| count as usize)
            .ok_or_else(|| StoreError::Backend {
                backend: "chroma".to_string(),
                details: format!("unexpected count response: {body}"),
            })
    }
}
