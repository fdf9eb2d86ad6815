use crate::documents::DocumentStore;
use crate::error::ReindexError;
use crate::ingest::IngestionPipeline;
use crate::models::{Chunk, ReindexReport};
use crate::store::VectorStore;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const NO_DOCUMENTS_MESSAGE: &str =
    "No documents found in storage. Please upload some documents first.";
pub const NO_READABLE_DOCUMENTS_MESSAGE: &str =
    "None of the stored documents could be read. Check the server logs for details.";

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
struct CollectedChunks {
    chunks: Vec<Chunk>,
    scanned: usize,
    skipped: Vec<SkippedDocument>,
}

impl CollectedChunks {
    fn document_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|chunk| chunk.source_file_name.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Rebuilds the collection from every supported file in the document store.
pub struct ReindexOrchestrator {
    documents: DocumentStore,
    pipeline: Arc<IngestionPipeline>,
    store: Arc<VectorStore>,
}

impl ReindexOrchestrator {
    pub fn new(
        documents: DocumentStore,
        pipeline: Arc<IngestionPipeline>,
        store: Arc<VectorStore>,
    ) -> Self {
        Self {
            documents,
            pipeline,
            store,
        }
    }

    /// Extract and chunk every stored file. A file that fails is logged and
    /// skipped; it never aborts the run.
    async fn collect_chunks(&self) -> Result<CollectedChunks, ReindexError> {
        if self.documents.ensure_root().await? {
            info!(dir = %self.documents.root().display(), "created document directory");
        }

        let files = self.documents.list();
        info!(count = files.len(), "found documents to reindex");

        let mut collected = CollectedChunks {
            scanned: files.len(),
            ..CollectedChunks::default()
        };

        for path in files {
            match self.pipeline.prepare(&path, None, Utc::now()).await {
                Ok(prepared) => {
                    info!(
                        file = %prepared.file_name,
                        page_count = prepared.page_count,
                        chunk_count = prepared.chunks.len(),
                        "prepared document"
                    );
                    collected.chunks.extend(prepared.chunks);
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipping unreadable document");
                    collected.skipped.push(SkippedDocument {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(collected)
    }

    /// Holds the document store's indexing lock exclusively from listing to
    /// rebuild, so no upload can land between the two.
    pub async fn reindex_all(&self) -> Result<ReindexReport, ReindexError> {
        let _guard = self.documents.reindex_guard().await;
        let collected = self.collect_chunks().await?;
        let document_count = collected.document_count();

        self.store.rebuild_collection(&collected.chunks).await?;
        let chunk_count = self.store.count().await?;

        let message = if collected.scanned == 0 {
            NO_DOCUMENTS_MESSAGE.to_string()
        } else if collected.chunks.is_empty() {
            NO_READABLE_DOCUMENTS_MESSAGE.to_string()
        } else {
            format!(
                "Successfully reindexed {document_count} documents with {chunk_count} total chunks."
            )
        };

        info!(
            document_count,
            chunk_count,
            skipped = collected.skipped.len(),
            "reindex finished"
        );

        Ok(ReindexReport {
            document_count,
            chunk_count,
            message: Some(message),
        })
    }
}
