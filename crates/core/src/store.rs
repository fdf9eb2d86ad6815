use crate::embeddings::EmbeddingService;
use crate::error::StoreError;
use crate::models::{Chunk, RetrievedChunk};
use crate::traits::{VectorDatabase, VectorRecord};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_COLLECTION: &str = "document_collection";
const UPSERT_BATCH: usize = 256;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub collection: String,
    pub request_timeout: Duration,
    pub deletion_poll_interval: Duration,
    pub deletion_max_polls: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            request_timeout: Duration::from_secs(60),
            deletion_poll_interval: Duration::from_millis(250),
            deletion_max_polls: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dropped {
    Absent,
    Deleted,
    Cleared,
}

/// Owns the lifecycle of the single embedding collection.
///
/// Writes (`add_chunks`, `rebuild_collection`) are serialized behind one
/// process-wide gate. `query` never takes the gate, so a read racing a
/// rebuild sees either the old or the new contents.
pub struct VectorStore {
    database: Arc<dyn VectorDatabase>,
    embedder: Arc<dyn EmbeddingService>,
    options: StoreOptions,
    write_gate: Mutex<()>,
}

impl VectorStore {
    pub fn new(
        database: Arc<dyn VectorDatabase>,
        embedder: Arc<dyn EmbeddingService>,
        options: StoreOptions,
    ) -> Self {
        Self {
            database,
            embedder,
            options,
            write_gate: Mutex::new(()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.options.collection
    }

    async fn timed<T, F>(&self, operation: &'static str, future: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let after = self.options.request_timeout;
        tokio::time::timeout(after, future)
            .await
            .map_err(|_| StoreError::Timeout { operation, after })?
    }

    async fn collection_listed(&self) -> Result<bool, StoreError> {
        let collections = self
            .timed("list collections", self.database.list_collections())
            .await?;
        Ok(collections.iter().any(|name| name == self.collection()))
    }

    pub async fn ensure_collection_exists(&self) -> Result<(), StoreError> {
        if self.collection_listed().await? {
            debug!(collection = self.collection(), "collection already exists");
            return Ok(());
        }
        self.create_collection().await
    }

    async fn create_collection(&self) -> Result<(), StoreError> {
        let created = self
            .timed(
                "create collection",
                self.database
                    .create_collection(self.collection(), self.embedder.dimensions()),
            )
            .await;

        match created {
            Ok(()) => {
                info!(collection = self.collection(), backend = self.database.backend(), "created collection");
                Ok(())
            }
            Err(StoreError::CollectionExists(_)) => {
                info!(collection = self.collection(), "collection already exists, proceeding with it");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    pub async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let _gate = self.write_gate.lock().await;
        self.add_chunks_locked(chunks).await
    }

    async fn add_chunks_locked(&self, chunks: &[Chunk]) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            debug!(collection = self.collection(), "no chunks to add");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .timed("embed documents", self.embedder.embed_documents(&texts))
            .await?;
        if vectors.len() != chunks.len() {
            return Err(StoreError::EmbeddingMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord::from_chunk(chunk, vector))
            .collect();

        for batch in records.chunks(UPSERT_BATCH) {
            let upserted = self
                .timed("upsert", self.database.upsert(self.collection(), batch))
                .await;
            match upserted {
                Ok(()) => {}
                Err(StoreError::CollectionNotFound(_)) => {
                    self.create_collection().await?;
                    self.timed("upsert", self.database.upsert(self.collection(), batch))
                        .await?;
                }
                Err(error) => return Err(error),
            }
        }

        info!(collection = self.collection(), chunk_count = records.len(), "added chunks");
        Ok(records.len())
    }

    /// Top `k` chunks, closest first. A missing or empty collection yields no
    /// results rather than an error.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, StoreError> {
        let available = self.count().await?;
        if available == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .timed("embed query", self.embedder.embed_query(text))
            .await?;

        let searched = self
            .timed(
                "nearest neighbors",
                self.database
                    .nearest_neighbors(self.collection(), &vector, k.min(available)),
            )
            .await;

        let mut hits = match searched {
            Ok(hits) => hits,
            Err(StoreError::CollectionNotFound(_)) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        hits.sort_by(|left, right| {
            let left = left.distance.unwrap_or(f64::MAX);
            let right = right.distance.unwrap_or(f64::MAX);
            left.total_cmp(&right)
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        match self
            .timed("count", self.database.count(self.collection()))
            .await
        {
            Ok(count) => Ok(count),
            Err(StoreError::CollectionNotFound(_)) => Ok(0),
            Err(error) => Err(error),
        }
    }

    /// Drop, recreate and repopulate the collection.
    ///
    /// Not atomic: a crash after the drop leaves the collection absent or
    /// empty. Re-running with the same chunks converges to the same contents.
    pub async fn rebuild_collection(&self, all_chunks: &[Chunk]) -> Result<usize, StoreError> {
        let _gate = self.write_gate.lock().await;

        if self.drop_collection().await? == Dropped::Deleted {
            self.wait_until_deleted().await?;
        }
        self.create_collection().await?;
        let added = self.add_chunks_locked(all_chunks).await?;

        info!(collection = self.collection(), chunk_count = added, "rebuilt collection");
        Ok(added)
    }

    async fn drop_collection(&self) -> Result<Dropped, StoreError> {
        if !self.collection_listed().await? {
            debug!(collection = self.collection(), "no collection to delete");
            return Ok(Dropped::Absent);
        }

        let deleted = self
            .timed("delete collection", self.database.delete_collection(self.collection()))
            .await;

        match deleted {
            Ok(()) => {
                info!(collection = self.collection(), "deleted existing collection");
                Ok(Dropped::Deleted)
            }
            Err(StoreError::CollectionNotFound(_)) => {
                info!(collection = self.collection(), "collection was already deleted");
                Ok(Dropped::Deleted)
            }
            Err(error) if error.is_timeout() => Err(error),
            Err(error) => {
                warn!(collection = self.collection(), %error, "collection deletion failed, clearing records instead");
                let cleared = self
                    .timed("clear collection", self.database.clear_collection(self.collection()))
                    .await;
                match cleared {
                    Ok(()) => Ok(Dropped::Cleared),
                    Err(StoreError::CollectionNotFound(_)) => Ok(Dropped::Deleted),
                    Err(error) => Err(error),
                }
            }
        }
    }

    async fn wait_until_deleted(&self) -> Result<(), StoreError> {
        for _ in 0..self.options.deletion_max_polls.max(1) {
            if !self.collection_listed().await? {
                return Ok(());
            }
            tokio::time::sleep(self.options.deletion_poll_interval).await;
        }

        Err(StoreError::Backend {
            backend: self.database.backend().to_string(),
            details: format!(
                "collection {} still listed after deletion",
                self.collection()
            ),
        })
    }
}
