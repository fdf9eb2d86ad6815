pub mod answer;
pub mod chunking;
pub mod documents;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod stores;
pub mod traits;

pub use answer::{render_prompt, AnswerGenerator, INSUFFICIENT_CONTEXT_ANSWER, NO_INFORMATION_ANSWER};
pub use chunking::{build_chunks, normalize_whitespace, split_text, ChunkingConfig};
pub use documents::{discover_documents, sanitize_file_name, DocumentStore};
pub use embeddings::{CharacterNgramEmbedder, CohereEmbedder, EmbeddingService, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    ChunkingError, ExtractionError, IngestionError, LlmError, QueryError, ReindexError, StoreError,
};
pub use extractor::{is_supported, DocumentExtractor, FileExtractor, LopdfExtractor, TextExtractor};
pub use ingest::{IngestionPipeline, PreparedDocument};
pub use llm::ClaudeProvider;
pub use models::{
    ChatAnswer, Chunk, IngestReport, IngestionOptions, PageText, ReindexReport, RetrievedChunk,
    Source, SourceMetadata,
};
pub use orchestrator::{ReindexOrchestrator, SkippedDocument, NO_DOCUMENTS_MESSAGE};
pub use store::{StoreOptions, VectorStore, DEFAULT_COLLECTION};
pub use stores::{ChromaStore, InMemoryVectorDatabase, QdrantStore};
pub use traits::{LanguageModel, VectorDatabase, VectorRecord};
