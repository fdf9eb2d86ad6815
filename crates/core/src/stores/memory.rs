use crate::error::StoreError;
use crate::models::RetrievedChunk;
use crate::traits::{VectorDatabase, VectorRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Brute-force cosine search over records held in process memory.
#[derive(Default)]
pub struct InMemoryVectorDatabase {
    collections: RwLock<BTreeMap<String, BTreeMap<String, VectorRecord>>>,
}

impl InMemoryVectorDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend {
            backend: "memory".to_string(),
            details: "collection lock poisoned".to_string(),
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorDatabase for InMemoryVectorDatabase {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections.keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str, _dimensions: usize) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        if collections.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    async fn clear_collection(&self, name: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let records = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        records.clear();
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        for record in records {
            stored.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        let stored = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut scored: Vec<(f32, &VectorRecord)> = stored
            .values()
            .map(|record| (cosine_similarity(vector, &record.vector), record))
            .collect();
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(similarity, record)| RetrievedChunk {
                chunk_id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance: Some(1.0 - f64::from(similarity)),
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        collections
            .get(collection)
            .map(BTreeMap::len)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceMetadata;

    fn record(id: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("text {id}"),
            metadata: SourceMetadata {
                source: "a.txt".to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn lifecycle_reports_typed_races() {
        let db = InMemoryVectorDatabase::new();
        db.create_collection("docs", 2).await.expect("first create");
        assert!(matches!(
            db.create_collection("docs", 2).await,
            Err(StoreError::CollectionExists(_))
        ));
        db.delete_collection("docs").await.expect("delete");
        assert!(matches!(
            db.delete_collection("docs").await,
            Err(StoreError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn nearest_neighbors_are_ranked_closest_first() {
        let db = InMemoryVectorDatabase::new();
        db.create_collection("docs", 2).await.expect("create");
        db.upsert(
            "docs",
            &[record("far", vec![0.0, 1.0]), record("near", vec![1.0, 0.1])],
        )
        .await
        .expect("upsert");

        let hits = db.nearest_neighbors("docs", &[1.0, 0.0], 2).await.expect("search");
        assert_eq!(hits[0].chunk_id, "near");
        assert_eq!(hits[1].chunk_id, "far");
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let db = InMemoryVectorDatabase::new();
        db.create_collection("docs", 2).await.expect("create");
        db.upsert("docs", &[record("a", vec![1.0, 0.0])]).await.expect("upsert");
        db.upsert("docs", &[record("a", vec![0.0, 1.0])]).await.expect("upsert");
        assert_eq!(db.count("docs").await.expect("count"), 1);
    }
}
