use crate::chunking::{build_chunks, ChunkingConfig};
use crate::documents::DocumentStore;
use crate::error::{ExtractionError, IngestionError};
use crate::extractor::DocumentExtractor;
use crate::models::{mime_type_for_extension, Chunk, IngestReport, IngestionOptions};
use crate::store::VectorStore;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A document that has been extracted and chunked but not yet indexed.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub file_name: String,
    pub page_count: usize,
    pub chunks: Vec<Chunk>,
}

pub struct IngestionPipeline {
    extractor: Arc<dyn DocumentExtractor>,
    store: Arc<VectorStore>,
    options: IngestionOptions,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn DocumentExtractor>,
        store: Arc<VectorStore>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            extractor,
            store,
            options,
        }
    }

    /// Extract and chunk one file. Nothing is written to the vector store.
    pub async fn prepare(
        &self,
        path: &Path,
        mime_type: Option<&str>,
        uploaded_at: DateTime<Utc>,
    ) -> Result<PreparedDocument, IngestionError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestionError::MissingFileName(path.display().to_string()))?
            .to_string();

        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|error| ExtractionError::Io(std::io::Error::other(error)))??;

        let inferred = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_type_for_extension);
        let mime_type = mime_type.or(inferred);

        let chunks = build_chunks(
            &pages,
            &file_name,
            uploaded_at,
            mime_type,
            ChunkingConfig::from(&self.options),
        )?;

        Ok(PreparedDocument {
            file_name,
            page_count: pages.len(),
            chunks,
        })
    }

    pub async fn ingest(&self, path: &Path) -> Result<IngestReport, IngestionError> {
        self.ingest_with_mime_type(path, None).await
    }

    /// Chunks are handed to the store in a single call once every step
    /// before it has succeeded.
    pub async fn ingest_with_mime_type(
        &self,
        path: &Path,
        mime_type: Option<&str>,
    ) -> Result<IngestReport, IngestionError> {
        let prepared = self.prepare(path, mime_type, Utc::now()).await?;
        self.store.add_chunks(&prepared.chunks).await?;

        info!(
            file = %prepared.file_name,
            page_count = prepared.page_count,
            chunk_count = prepared.chunks.len(),
            "ingested document"
        );

        Ok(IngestReport {
            file_name: prepared.file_name,
            page_count: prepared.page_count,
            chunk_count: prepared.chunks.len(),
        })
    }

    /// Save an upload into the document store and index it. Runs under the
    /// store's shared indexing lock, so a reindex either sees the saved file
    /// or finishes before its chunks are added.
    pub async fn ingest_upload(
        &self,
        documents: &DocumentStore,
        file_name: &str,
        bytes: &[u8],
        mime_type: Option<&str>,
    ) -> Result<IngestReport, IngestionError> {
        let _guard = documents.upload_guard().await;
        let path = documents
            .save(file_name, bytes)
            .await
            .map_err(|source| IngestionError::Save {
                file_name: file_name.to_string(),
                source,
            })?;
        info!(file = %file_name, bytes = bytes.len(), "stored upload");

        self.ingest_with_mime_type(&path, mime_type).await
    }
}
